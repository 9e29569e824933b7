// # DCDN L2 Source IP Provider
//
// This crate provides the edge-node IP source for the synchronizer: the
// list of DCDN L2 node addresses that origin firewalls must admit.
//
// ## Architecture
//
// One `DescribeDcdnL2Ips` RPC call per fetch. The response carries a flat
// `Vips` list; each entry becomes a `SourceIpRecord` with fixed metadata
// (the API reports no location or carrier).
//
// ## Trust Level: Untrusted (Source IP Provider)
//
// - ✅ One HTTPS request per `fetch()`
// - ❌ NO retry logic (owned by SyncEngine)
// - ❌ NO normalization or filtering (owned by SyncEngine)
// - ❌ NO background tasks
//
// ## API Reference
//
// - Endpoint: `dcdn.aliyuncs.com` (global)
// - Version: `2018-01-15`
// - Action: `DescribeDcdnL2Ips`

use async_trait::async_trait;
use chrono::Utc;
use l2sync_aliyun::credentials::{self, CredentialProvider, CredentialScope};
use l2sync_aliyun::RpcClient;
use l2sync_core::config::CloudAccountConfig;
use l2sync_core::traits::{SourceIpProvider, SourceIpRecord};
use l2sync_core::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

/// DCDN API host (global endpoint)
pub const DCDN_HOST: &str = "dcdn.aliyuncs.com";

/// DCDN API version
pub const DCDN_API_VERSION: &str = "2018-01-15";

const ACTION_DESCRIBE_L2_IPS: &str = "DescribeDcdnL2Ips";

/// Location reported for every edge node
pub const DEFAULT_LOCATION: &str = "Global";
/// Carrier reported for every edge node
pub const DEFAULT_ISP: &str = "Alibaba Cloud";
/// Status reported for every edge node
pub const DEFAULT_STATUS: &str = "Active";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeDcdnL2IpsResponse {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    vips: Option<Vec<Option<String>>>,
}

/// Source IP provider backed by the DCDN API
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. Retries and deadlines are owned by the
/// `SyncEngine`.
#[derive(Debug)]
pub struct DcdnSourceIpProvider {
    client: RpcClient,
}

impl DcdnSourceIpProvider {
    /// Create a provider with resolved credentials
    pub fn new(credentials: CredentialProvider) -> Result<Self> {
        Ok(Self {
            client: RpcClient::new("dcdn", DCDN_HOST, DCDN_API_VERSION, credentials)?,
        })
    }

    /// Create a provider from the `dcdn` config section
    ///
    /// Credentials follow the config → `DCDN_*` env → generic env →
    /// credentials file → ECS RAM role chain. The region is informational;
    /// the DCDN endpoint is global.
    pub fn from_config(config: &CloudAccountConfig) -> Result<Self> {
        let credentials = credentials::resolve(config.explicit_keys(), CredentialScope::Dcdn)?;
        tracing::info!(
            region = %config.region,
            credentials = %credentials.source(),
            "DCDN client configured"
        );
        Self::new(credentials)
    }

    /// Send requests to another base URL
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client = self.client.with_endpoint(endpoint);
        self
    }
}

#[async_trait]
impl SourceIpProvider for DcdnSourceIpProvider {
    async fn fetch(&self) -> Result<Vec<SourceIpRecord>> {
        let response: DescribeDcdnL2IpsResponse = self
            .client
            .call(ACTION_DESCRIBE_L2_IPS, &BTreeMap::new())
            .await?;

        let fetched_at = Utc::now();
        let records: Vec<SourceIpRecord> = response
            .vips
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|vip| SourceIpRecord {
                ip: vip,
                location: DEFAULT_LOCATION.to_string(),
                isp: DEFAULT_ISP.to_string(),
                status: DEFAULT_STATUS.to_string(),
                last_updated: fetched_at,
            })
            .collect();

        tracing::debug!(
            count = records.len(),
            request_id = response.request_id.as_deref().unwrap_or(""),
            "Fetched DCDN L2 IPs"
        );
        Ok(records)
    }

    fn provider_name(&self) -> &'static str {
        "dcdn"
    }
}
