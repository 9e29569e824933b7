// # l2sync-aliyun
//
// Alibaba Cloud plumbing shared by the DCDN and Cloud Firewall clients.
//
// ## Trust Level: Untrusted (remote API transport)
//
// **Allowed Capabilities**:
// - ✅ HTTPS calls to the configured service endpoint
// - ✅ HTTP calls to the instance metadata service for RAM role credentials
// - ✅ Caching STS credentials until shortly before expiry
//
// **Forbidden Capabilities**:
// - ❌ Retry logic (owned by SyncEngine)
// - ❌ Spawning tasks
// - ❌ Logging access key secrets or security tokens
//
// ## Modules
//
// - `credentials`: config → env → credentials file → ECS RAM role chain
// - `sign`: ACS3-HMAC-SHA256 request signing
// - `query`: RFC 3986 sorted query strings
// - `client`: signed RPC calls with error classification

pub mod client;
pub mod credentials;
pub mod query;
pub mod sign;

pub use client::RpcClient;
pub use credentials::{AccessKey, CredentialProvider, CredentialScope, CredentialSource};
