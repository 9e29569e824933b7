//! ACS3-HMAC-SHA256 request signing
//!
//! Reference: <https://www.alibabacloud.com/help/en/sdk/product-overview/v3-request-structure-and-signature>
//!
//! RPC-style requests are `POST /` with an empty body; the signed headers
//! are `host` plus every `x-acs-*` header, sorted by name.

use crate::credentials::AccessKey;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Signature algorithm name
pub const ALGORITHM: &str = "ACS3-HMAC-SHA256";

/// SHA-256 of the empty body
pub const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

type HmacSha256 = Hmac<Sha256>;

/// Request details covered by the signature
#[derive(Debug, Clone)]
pub struct SigningInput<'a> {
    pub host: &'a str,
    pub action: &'a str,
    pub version: &'a str,
    pub query: &'a str,
    pub timestamp: &'a str,
    pub nonce: &'a str,
}

/// A signed request: headers to send, including `Authorization`
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// Lowercase header name to value, `Authorization` last
    pub headers: Vec<(String, String)>,
}

/// HMAC-SHA256 of `data` keyed with `key`
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Sign an RPC request
pub fn sign(key: &AccessKey, input: &SigningInput<'_>) -> SignedHeaders {
    let mut headers = BTreeMap::from([
        ("host", input.host.to_string()),
        ("x-acs-action", input.action.to_string()),
        ("x-acs-content-sha256", EMPTY_BODY_SHA256.to_string()),
        ("x-acs-date", input.timestamp.to_string()),
        ("x-acs-signature-nonce", input.nonce.to_string()),
        ("x-acs-version", input.version.to_string()),
    ]);
    if let Some(token) = &key.security_token {
        headers.insert("x-acs-security-token", token.clone());
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    let signed_headers = headers.keys().copied().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "POST\n/\n{}\n{canonical_headers}\n{signed_headers}\n{EMPTY_BODY_SHA256}",
        input.query
    );
    tracing::trace!("CanonicalRequest:\n{canonical_request}");

    let hashed_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = format!("{ALGORITHM}\n{hashed_request}");
    let signature = hex::encode(hmac_sha256(
        key.secret.as_bytes(),
        string_to_sign.as_bytes(),
    ));

    let authorization = format!(
        "{ALGORITHM} Credential={},SignedHeaders={signed_headers},Signature={signature}",
        key.id
    );

    let mut out: Vec<(String, String)> = headers
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    out.push(("authorization".to_string(), authorization));
    SignedHeaders { headers: out }
}

impl SignedHeaders {
    /// Value of one header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
