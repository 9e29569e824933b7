//! Access key resolution
//!
//! Each client resolves its own credentials, in this order:
//!
//! 1. Explicit `access_key_id` / `access_key_secret` from the config file
//! 2. Client-specific environment pair (`DCDN_ALIBABA_CLOUD_ACCESS_KEY_ID`, ...)
//! 3. `ALIBABA_CLOUD_ACCESS_KEY_ID` / `ALIBABA_CLOUD_ACCESS_KEY_SECRET`,
//!    with `ALIBABA_CLOUD_SECURITY_TOKEN` when set
//! 4. The shared credentials file (`ALIBABA_CLOUD_CREDENTIALS_FILE` or
//!    `~/.alibabacloud/credentials`), profile `ALIBABA_CLOUD_PROFILE` or `default`
//! 5. The ECS instance RAM role named by `ALIBABA_CLOUD_ECS_METADATA`
//!
//! Secrets never appear in logs or `Debug` output.

use chrono::{DateTime, Utc};
use l2sync_core::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

pub const ENV_ACCESS_KEY_ID: &str = "ALIBABA_CLOUD_ACCESS_KEY_ID";
pub const ENV_ACCESS_KEY_SECRET: &str = "ALIBABA_CLOUD_ACCESS_KEY_SECRET";
pub const ENV_SECURITY_TOKEN: &str = "ALIBABA_CLOUD_SECURITY_TOKEN";
pub const ENV_CREDENTIALS_FILE: &str = "ALIBABA_CLOUD_CREDENTIALS_FILE";
pub const ENV_PROFILE: &str = "ALIBABA_CLOUD_PROFILE";
pub const ENV_ECS_METADATA: &str = "ALIBABA_CLOUD_ECS_METADATA";

/// Instance metadata service
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://100.100.100.200";

const METADATA_CREDENTIALS_PATH: &str = "/latest/meta-data/ram/security-credentials";

/// STS credentials are refreshed this many seconds before they expire
const REFRESH_MARGIN_SECS: i64 = 180;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// An access key pair, optionally with an STS token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKey {
    pub id: String,
    /// ⚠️ NEVER log this value
    pub secret: String,
    pub security_token: Option<String>,
}

impl AccessKey {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            security_token: None,
        }
    }

    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }
}

// Custom Debug implementation that hides the secret and token
impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKey")
            .field("id", &self.id)
            .field("secret", &"<REDACTED>")
            .field(
                "security_token",
                &self.security_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Which client the credentials are for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScope {
    /// DCDN source IP client
    Dcdn,
    /// Cloud Firewall address book client
    Firewall,
}

impl CredentialScope {
    fn env_prefix(self) -> &'static str {
        match self {
            Self::Dcdn => "DCDN_",
            Self::Firewall => "FIREWALL_",
        }
    }

    /// Client-specific key id variable
    pub fn id_var(self) -> String {
        format!("{}{ENV_ACCESS_KEY_ID}", self.env_prefix())
    }

    /// Client-specific secret variable
    pub fn secret_var(self) -> String {
        format!("{}{ENV_ACCESS_KEY_SECRET}", self.env_prefix())
    }
}

/// Where the credentials came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    ScopedEnv(String),
    Env,
    CredentialsFile { path: PathBuf, profile: String },
    EcsRamRole(String),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config file"),
            Self::ScopedEnv(var) => write!(f, "environment ({var})"),
            Self::Env => write!(f, "environment ({ENV_ACCESS_KEY_ID})"),
            Self::CredentialsFile { path, profile } => {
                write!(f, "credentials file {} [{}]", path.display(), profile)
            }
            Self::EcsRamRole(role) => write!(f, "ECS RAM role {role}"),
        }
    }
}

/// Resolved credentials for one client
pub struct CredentialProvider {
    source: CredentialSource,
    kind: ProviderKind,
}

enum ProviderKind {
    Static(AccessKey),
    EcsRamRole(EcsRoleCredentials),
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CredentialProvider {
    /// Fixed credentials
    pub fn fixed(key: AccessKey, source: CredentialSource) -> Self {
        Self {
            source,
            kind: ProviderKind::Static(key),
        }
    }

    /// STS credentials for an ECS instance RAM role
    pub fn ecs_ram_role(role: impl Into<String>) -> Result<Self> {
        let role = role.into();
        Ok(Self {
            source: CredentialSource::EcsRamRole(role.clone()),
            kind: ProviderKind::EcsRamRole(EcsRoleCredentials::new(role)?),
        })
    }

    /// Point the RAM role lookup at another metadata endpoint
    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        if let ProviderKind::EcsRamRole(role) = &mut self.kind {
            role.endpoint = endpoint.into().trim_end_matches('/').to_string();
        }
        self
    }

    /// Where these credentials came from
    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Current access key, refreshing STS credentials when close to expiry
    pub async fn access_key(&self) -> Result<AccessKey> {
        match &self.kind {
            ProviderKind::Static(key) => Ok(key.clone()),
            ProviderKind::EcsRamRole(role) => role.access_key().await,
        }
    }
}

/// Resolve credentials from the process environment
pub fn resolve(
    explicit: Option<(&str, &str)>,
    scope: CredentialScope,
) -> Result<CredentialProvider> {
    resolve_with(
        explicit,
        scope,
        &|name: &str| std::env::var(name).ok(),
        dirs::home_dir(),
    )
}

/// Resolve credentials with an injected environment and home directory
pub fn resolve_with(
    explicit: Option<(&str, &str)>,
    scope: CredentialScope,
    env: &dyn Fn(&str) -> Option<String>,
    home: Option<PathBuf>,
) -> Result<CredentialProvider> {
    let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    if let Some((id, secret)) = explicit {
        return Ok(CredentialProvider::fixed(
            AccessKey::new(id, secret),
            CredentialSource::Config,
        ));
    }

    let (id_var, secret_var) = (scope.id_var(), scope.secret_var());
    if let (Some(id), Some(secret)) = (var(&id_var), var(&secret_var)) {
        return Ok(CredentialProvider::fixed(
            AccessKey::new(id, secret),
            CredentialSource::ScopedEnv(id_var),
        ));
    }

    if let (Some(id), Some(secret)) = (var(ENV_ACCESS_KEY_ID), var(ENV_ACCESS_KEY_SECRET)) {
        let mut key = AccessKey::new(id, secret);
        key.security_token = var(ENV_SECURITY_TOKEN);
        return Ok(CredentialProvider::fixed(key, CredentialSource::Env));
    }

    let explicit_file = var(ENV_CREDENTIALS_FILE).map(PathBuf::from);
    let file = explicit_file
        .clone()
        .or_else(|| home.map(|h| h.join(".alibabacloud").join("credentials")));
    if let Some(path) = file {
        if path.is_file() {
            let profile = var(ENV_PROFILE).unwrap_or_else(|| "default".to_string());
            if let Some(provider) = from_credentials_file(&path, &profile)? {
                return Ok(provider);
            }
        } else if explicit_file.is_some() {
            return Err(Error::credentials(format!(
                "{ENV_CREDENTIALS_FILE} points to {}, which does not exist",
                path.display()
            )));
        }
    }

    if let Some(role) = var(ENV_ECS_METADATA) {
        return CredentialProvider::ecs_ram_role(role);
    }

    Err(Error::credentials(format!(
        "no credentials found for {scope:?}: set access keys in the config file, \
         {id_var}/{secret_var}, {ENV_ACCESS_KEY_ID}/{ENV_ACCESS_KEY_SECRET}, \
         a credentials file, or {ENV_ECS_METADATA}"
    )))
}

/// Read one profile; `None` when the profile is absent
fn from_credentials_file(path: &Path, profile: &str) -> Result<Option<CredentialProvider>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::credentials(format!("failed to read {}: {}", path.display(), e))
    })?;
    let sections = parse_ini(&text);
    let Some(section) = sections.get(profile) else {
        return Ok(None);
    };

    let field = |name: &str| {
        section
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| {
                Error::credentials(format!(
                    "profile [{profile}] in {} is missing {name}",
                    path.display()
                ))
            })
    };

    let kind = section.get("type").map(String::as_str).unwrap_or("access_key");
    let provider = match kind {
        "access_key" => CredentialProvider::fixed(
            AccessKey::new(field("access_key_id")?, field("access_key_secret")?),
            CredentialSource::CredentialsFile {
                path: path.to_path_buf(),
                profile: profile.to_string(),
            },
        ),
        "ecs_ram_role" => CredentialProvider::ecs_ram_role(field("role_name")?)?,
        other => {
            return Err(Error::credentials(format!(
                "profile [{profile}] in {} has unsupported type '{other}'",
                path.display()
            )));
        }
    };
    Ok(Some(provider))
}

/// Minimal INI reader: `[section]` headers and `key = value` lines
fn parse_ini(text: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let (Some(section), Some((key, value))) = (&current, line.split_once('=')) {
            let value = value.trim().trim_matches('"').to_string();
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value);
        }
    }

    sections
}

/// STS credentials from the instance metadata service, cached until shortly
/// before they expire
struct EcsRoleCredentials {
    role: String,
    endpoint: String,
    http: reqwest::Client,
    cached: Mutex<Option<StsKey>>,
}

#[derive(Clone)]
struct StsKey {
    key: AccessKey,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    #[serde(default)]
    code: Option<String>,
    access_key_id: String,
    access_key_secret: String,
    security_token: String,
    expiration: DateTime<Utc>,
}

impl EcsRoleCredentials {
    fn new(role: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .map_err(|e| Error::credentials(format!("failed to build metadata client: {e}")))?;
        Ok(Self {
            role,
            endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            http,
            cached: Mutex::new(None),
        })
    }

    async fn access_key(&self) -> Result<AccessKey> {
        let mut cached = self.cached.lock().await;
        if let Some(sts) = cached.as_ref()
            && (sts.expires_at - Utc::now()).num_seconds() > REFRESH_MARGIN_SECS
        {
            return Ok(sts.key.clone());
        }

        let sts = self.fetch().await?;
        tracing::debug!(
            role = %self.role,
            expires_at = %sts.expires_at,
            "Refreshed ECS RAM role credentials"
        );
        let key = sts.key.clone();
        *cached = Some(sts);
        Ok(key)
    }

    async fn fetch(&self) -> Result<StsKey> {
        let url = format!("{}{}/{}", self.endpoint, METADATA_CREDENTIALS_PATH, self.role);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::http(format!("instance metadata request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                404 => Error::credentials(format!(
                    "RAM role '{}' not found on this instance",
                    self.role
                )),
                500..=599 => Error::http(format!("instance metadata returned {status}")),
                _ => Error::credentials(format!("instance metadata returned {status}")),
            });
        }

        let body: MetadataCredentials = response
            .json()
            .await
            .map_err(|e| Error::credentials(format!("invalid instance metadata response: {e}")))?;

        if let Some(code) = body.code.as_deref()
            && code != "Success"
        {
            return Err(Error::credentials(format!(
                "instance metadata returned code {code} for role '{}'",
                self.role
            )));
        }

        Ok(StsKey {
            key: AccessKey::new(body.access_key_id, body.access_key_secret)
                .with_security_token(body.security_token),
            expires_at: body.expiration,
        })
    }
}
