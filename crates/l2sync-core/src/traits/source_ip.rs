// # Source IP Provider Trait
//
// Defines the interface for fetching the CDN edge-node IP list.
//
// ## Implementations
//
// - Alibaba Cloud DCDN L2 nodes: `l2sync-ip-dcdn` crate
//
// ## Usage
//
// ```rust,ignore
// use l2sync_core::SourceIpProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* SourceIpProvider implementation */;
//
//     for record in source.fetch().await? {
//         println!("{} ({})", record.ip, record.location);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One edge-node IP reported by the source
///
/// Produced fresh on every fetch. Identity is the IP string alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIpRecord {
    /// IP literal or CIDR block, as reported
    pub ip: String,
    /// Where the node sits
    pub location: String,
    /// Network operator
    pub isp: String,
    /// Node status as reported by the source
    pub status: String,
    /// When this record was fetched
    pub last_updated: DateTime<Utc>,
}

impl SourceIpRecord {
    /// Create a record with unknown location, ISP and status
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            location: String::new(),
            isp: String::new(),
            status: String::new(),
            last_updated: Utc::now(),
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the ISP
    pub fn with_isp(mut self, isp: impl Into<String>) -> Self {
        self.isp = isp.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// Trait for source IP implementations
///
/// # Contract
///
/// - `fetch()` returns the complete current list in one call. The engine
///   calls it once per pass, never once per group.
/// - Entries may be bare IPs or CIDR blocks of either family. Filtering and
///   normalization belong to the engine.
///
/// # Forbidden
///
/// - Retrying or backing off (owned by `SyncEngine`)
/// - Caching the list between passes
/// - Spawning background tasks
#[async_trait]
pub trait SourceIpProvider: Send + Sync {
    /// Fetch the current edge-node IP list
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<SourceIpRecord>)`: The full list, possibly empty
    /// - `Err(Error)`: If the list could not be retrieved
    async fn fetch(&self) -> Result<Vec<SourceIpRecord>, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
