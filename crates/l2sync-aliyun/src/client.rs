//! Signed RPC transport
//!
//! One [`RpcClient`] per service endpoint. Each [`call`](RpcClient::call)
//! makes exactly one HTTP request; retries belong to the sync engine, so
//! errors are classified here and handed back untouched:
//!
//! | Response                                     | Error                   |
//! |----------------------------------------------|-------------------------|
//! | `Throttling*` code, HTTP 429                 | `Error::RateLimited`    |
//! | `InvalidAccessKeyId*`, signature, 401 / 403  | `Error::Authentication` |
//! | `ServiceUnavailable`, `InternalError`, 5xx   | `Error::Http`           |
//! | transport failure                            | `Error::Http`           |
//! | request timeout                              | `Error::Timeout`        |
//! | anything else                                | `Error::Provider`       |

use crate::credentials::{CredentialProvider, CredentialSource};
use crate::query::canonical_query;
use crate::sign::{SigningInput, sign};
use chrono::Utc;
use l2sync_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Connect timeout for API requests
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total timeout for API requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC-style client for one Alibaba Cloud service
pub struct RpcClient {
    /// Short service name used in errors and logs
    service: &'static str,
    /// Host covered by the signature
    host: String,
    /// Base URL requests are sent to
    endpoint: String,
    /// API version (`x-acs-version`)
    version: &'static str,
    credentials: CredentialProvider,
    http: reqwest::Client,
}

// Custom Debug implementation; credentials are summarized by source only
impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("version", &self.version)
            .field("credentials", &self.credentials.source().to_string())
            .finish()
    }
}

impl RpcClient {
    /// Create a client for `https://{host}/`
    pub fn new(
        service: &'static str,
        host: impl Into<String>,
        version: &'static str,
        credentials: CredentialProvider,
    ) -> Result<Self> {
        let host = host.into();
        let http = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::setup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            service,
            endpoint: format!("https://{host}"),
            host,
            version,
            credentials,
            http,
        })
    }

    /// Send requests to another base URL (the signed host is unchanged)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Signed host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Base URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Where the credentials came from
    pub fn credential_source(&self) -> &CredentialSource {
        self.credentials.source()
    }

    /// Invoke `action` with `params` in the query string
    pub async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<T> {
        let key = self.credentials.access_key().await?;
        let query = canonical_query(params);
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();

        let signed = sign(
            &key,
            &SigningInput {
                host: &self.host,
                action,
                version: self.version,
                query: &query,
                timestamp: &timestamp,
                nonce: &nonce,
            },
        );

        let url = if query.is_empty() {
            format!("{}/", self.endpoint)
        } else {
            format!("{}/?{}", self.endpoint, query)
        };

        debug!(service = self.service, action, "Calling API");

        let mut request = self.http.post(&url);
        for (name, value) in &signed.headers {
            // reqwest derives Host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("{} {action}: {e}", self.service))
            } else {
                Error::http(format!("{} {action}: request failed: {e}", self.service))
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            Error::http(format!("{} {action}: failed to read response: {e}", self.service))
        })?;

        let value = serde_json::from_str::<Value>(&body).ok();
        let api_error = value.as_ref().and_then(api_error);

        if status >= 400 || api_error.is_some() {
            let err = classify(self.service, action, status, api_error, &body);
            warn!(service = self.service, action, status, error = %err, "API call failed");
            return Err(err);
        }

        let value = value.ok_or_else(|| {
            Error::provider(
                self.service,
                format!("{action}: response is not valid JSON"),
            )
        })?;

        serde_json::from_value(value).map_err(|e| {
            Error::provider(self.service, format!("{action}: unexpected response: {e}"))
        })
    }
}

/// `Code`/`Message` pair from an error body
#[derive(Debug, Clone, PartialEq, Eq)]
struct ApiError {
    code: String,
    message: String,
    request_id: Option<String>,
}

fn api_error(value: &Value) -> Option<ApiError> {
    let code = value.get("Code").and_then(Value::as_str)?;
    let message = value.get("Message").and_then(Value::as_str)?;
    Some(ApiError {
        code: code.to_string(),
        message: message.to_string(),
        request_id: value
            .get("RequestId")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn classify(
    service: &'static str,
    action: &str,
    status: u16,
    api_error: Option<ApiError>,
    body: &str,
) -> Error {
    let Some(api) = api_error else {
        let detail = format!("{service} {action}: HTTP {status}: {}", truncate(body, 200));
        return match status {
            401 | 403 => Error::auth(detail),
            429 => Error::rate_limited(detail),
            500..=599 => Error::http(detail),
            _ => Error::provider(service, detail),
        };
    };

    let detail = match &api.request_id {
        Some(id) => format!(
            "{service} {action}: {} - {} (RequestId: {id})",
            api.code, api.message
        ),
        None => format!("{service} {action}: {} - {}", api.code, api.message),
    };

    let code = api.code.as_str();
    if code.starts_with("Throttling") || status == 429 {
        Error::rate_limited(detail)
    } else if code.starts_with("InvalidAccessKeyId")
        || code.starts_with("InvalidSecurityToken")
        || code == "SignatureDoesNotMatch"
        || code.starts_with("Forbidden")
        || status == 401
        || status == 403
    {
        Error::auth(detail)
    } else if code == "ServiceUnavailable" || code == "InternalError" || status >= 500 {
        Error::http(detail)
    } else {
        Error::provider(service, detail)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
