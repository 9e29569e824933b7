//! Configuration types for the synchronizer
//!
//! The configuration is a YAML document loaded once at startup and shared
//! read-only afterwards. Every section is optional in the file; absent
//! values fall back to the defaults below.

use crate::duration::parse_duration;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Region used when a cloud section omits `region`
pub const DEFAULT_REGION: &str = "ap-southeast-1";

/// Default path of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Credentials and region for the DCDN (source IP) client
    #[serde(default)]
    pub dcdn: CloudAccountConfig,

    /// Credentials and region for the Cloud Firewall (address book) client
    #[serde(default)]
    pub firewall: CloudAccountConfig,

    /// When and how passes run
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Target address groups
    #[serde(default)]
    pub sync: SyncConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate a configuration file
    ///
    /// A missing file is reported as [`Error::ConfigNotFound`] so the caller
    /// can offer to generate a sample instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(Error::config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        Self::from_yaml_str(&content).map_err(|e| match e {
            Error::Yaml(e) => Error::config(format!("failed to parse {}: {}", path.display(), e)),
            other => other,
        })
    }

    /// Parse and validate a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Cron and interval syntax are checked when the scheduler starts, since
    /// a one-shot run does not need them.
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        self.scheduler.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Credentials and region for one Alibaba Cloud API client
#[derive(Clone, Serialize, Deserialize)]
pub struct CloudAccountConfig {
    /// AccessKey ID (optional, falls back to the credential chain)
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// AccessKey secret (optional, falls back to the credential chain)
    #[serde(default)]
    pub access_key_secret: Option<String>,

    /// Region ID
    #[serde(default = "default_region")]
    pub region: String,
}

impl CloudAccountConfig {
    /// The explicit key pair, if both halves are present and non-empty
    pub fn explicit_keys(&self) -> Option<(&str, &str)> {
        let id = self.access_key_id.as_deref().map(str::trim)?;
        let secret = self.access_key_secret.as_deref().map(str::trim)?;
        if id.is_empty() || secret.is_empty() {
            return None;
        }
        Some((id, secret))
    }
}

impl Default for CloudAccountConfig {
    fn default() -> Self {
        Self {
            access_key_id: None,
            access_key_secret: None,
            region: default_region(),
        }
    }
}

// Custom Debug implementation that hides the secret
impl std::fmt::Debug for CloudAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudAccountConfig")
            .field("access_key_id", &self.access_key_id)
            .field(
                "access_key_secret",
                &self.access_key_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field("region", &self.region)
            .finish()
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Six-field cron expression (`sec min hour dom month dow`).
    /// Takes priority over `interval` when non-empty.
    #[serde(default)]
    pub cron: Option<String>,

    /// Fixed interval between passes when no cron expression is set
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Run one pass immediately on start
    #[serde(default)]
    pub run_on_start: bool,

    /// Deadline for a whole pass (fetch plus all group syncs).
    /// `"0"` disables the deadline.
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Retries after the first attempt of each remote call.
    /// Only transient failures are retried; `0` disables retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay before the first retry, doubled on each further attempt
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
}

impl SchedulerConfig {
    /// The cron expression, if one is configured
    pub fn cron_expression(&self) -> Option<&str> {
        self.cron
            .as_deref()
            .map(str::trim)
            .filter(|expr| !expr.is_empty())
    }

    /// Pass deadline, `None` when disabled
    pub fn timeout_duration(&self) -> Result<Option<Duration>> {
        let timeout = parse_duration(&self.timeout)
            .map_err(|e| Error::config(format!("scheduler.timeout: {e}")))?;
        Ok((!timeout.is_zero()).then_some(timeout))
    }

    /// Base retry delay
    pub fn retry_delay_duration(&self) -> Result<Duration> {
        parse_duration(&self.retry_delay)
            .map_err(|e| Error::config(format!("scheduler.retry_delay: {e}")))
    }

    /// Validate the scheduler configuration
    pub fn validate(&self) -> Result<()> {
        self.timeout_duration()?;
        self.retry_delay_duration()?;
        if self.max_retries > 10 {
            return Err(Error::config(format!(
                "scheduler.max_retries must be between 0 and 10. Got: {}",
                self.max_retries
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cron: None,
            interval: default_interval(),
            run_on_start: false,
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_interval() -> String {
    "168h".to_string()
}

fn default_timeout() -> String {
    "30m".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "5s".to_string()
}

/// Sync targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Address groups, processed in this order
    #[serde(default)]
    pub address_groups: Vec<AddressGroupSpec>,
}

impl SyncConfig {
    /// Validate the address group list
    pub fn validate(&self) -> Result<()> {
        if self.address_groups.is_empty() {
            return Err(Error::config("sync.address_groups must not be empty"));
        }

        let mut seen = HashSet::new();
        for group in &self.address_groups {
            let name = group.group_name.trim();
            if name.is_empty() {
                return Err(Error::config("address group name cannot be empty"));
            }
            if !seen.insert(name) {
                return Err(Error::config(format!(
                    "duplicate address group name: {name}"
                )));
            }
        }

        Ok(())
    }
}

/// One target address group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressGroupSpec {
    /// Remote group name (unique key)
    pub group_name: String,

    /// Description used when the group is created or replaced
    #[serde(default)]
    pub description: String,

    /// IP family tag
    #[serde(default)]
    pub ip_type: IpType,

    /// Keep an IP when any of these match (empty keeps everything)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Drop an IP when any of these match; wins over inclusion
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl AddressGroupSpec {
    /// Create a group that accepts every IP
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            description: String::new(),
            ip_type: IpType::default(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the include patterns
    pub fn with_include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the exclude patterns
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the IP family tag
    pub fn with_ip_type(mut self, ip_type: IpType) -> Self {
        self.ip_type = ip_type;
        self
    }
}

/// IP family tag of an address group
///
/// Only a tag: the pipeline delivers IPv4 entries to every group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpType {
    /// IPv4 only
    Ipv4,
    /// IPv6 only
    Ipv6,
    /// Both families
    #[default]
    Both,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Also write logs to this file
    #[serde(default)]
    pub file_path: Option<String>,
}

impl LoggingConfig {
    /// Validate the logging configuration
    pub fn validate(&self) -> Result<()> {
        validate_log_level(&self.level)
    }

    /// The log file path, if one is configured
    pub fn file_path(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file_path: None,
        }
    }
}

/// Check that a log level name is one of the supported levels
pub fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(Error::config(format!(
            "logging.level '{level}' is not valid. Valid levels: trace, debug, info, warn, error"
        ))),
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}
