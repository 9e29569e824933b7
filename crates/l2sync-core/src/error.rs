//! Error types for the synchronizer
//!
//! This module defines all error types used throughout the workspace.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for synchronizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the synchronizer
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (malformed file, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file does not exist
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Scheduler setup errors (bad cron expression, bad interval)
    #[error("Scheduler setup error: {0}")]
    Setup(String),

    /// Source IP retrieval failed
    #[error("Source IP fetch failed: {0}")]
    Fetch(String),

    /// One address group's create/replace call failed
    #[error("Address group '{group}' sync failed: {message}")]
    GroupSync {
        /// Group name
        group: String,
        /// Error message
        message: String,
    },

    /// Credential resolution errors
    #[error("Credential error: {0}")]
    Credentials(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP transport errors and 5xx responses
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// A single request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The pass deadline expired
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error reported by a remote API
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a scheduler setup error
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a group sync error
    pub fn group_sync(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GroupSync {
            group: group.into(),
            message: message.into(),
        }
    }

    /// Create a credential error
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a request timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a deadline error
    pub fn deadline(msg: impl Into<String>) -> Self {
        Self::DeadlineExceeded(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the same call may succeed
    ///
    /// Transport failures, 5xx responses, throttling and per-request
    /// timeouts are transient. Everything else (bad credentials, rejected
    /// parameters, expired pass deadline) fails the same way on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimited(_) | Self::Timeout(_)
        )
    }

    /// Whether this error belongs to startup (config, setup, credentials)
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::ConfigNotFound(_)
                | Self::Setup(_)
                | Self::Credentials(_)
                | Self::Yaml(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::http("connection reset").is_transient());
        assert!(Error::rate_limited("Throttling.User").is_transient());
        assert!(Error::timeout("30s").is_transient());

        assert!(!Error::auth("InvalidAccessKeyId.NotFound").is_transient());
        assert!(!Error::provider("cloudfw", "InvalidParameter").is_transient());
        assert!(!Error::deadline("pass").is_transient());
    }

    #[test]
    fn group_sync_message_names_group() {
        let err = Error::group_sync("dcdn-v4", "HTTP error: 503");
        assert_eq!(
            err.to_string(),
            "Address group 'dcdn-v4' sync failed: HTTP error: 503"
        );
    }

    #[test]
    fn startup_classification() {
        assert!(Error::config("empty groups").is_startup());
        assert!(Error::setup("bad cron").is_startup());
        assert!(Error::ConfigNotFound(PathBuf::from("configs/config.yaml")).is_startup());
        assert!(!Error::fetch("boom").is_startup());
    }
}
