// # Cloud Firewall Address Book Client
//
// This crate implements `AddressBookClient` for Alibaba Cloud Cloud
// Firewall, plus a helper that wraps it in the core `GroupSyncer`.
//
// ## Trust Level: Untrusted (Address Book Client)
//
// **Allowed Capabilities**:
// - ✅ One HTTPS request per trait method call
// - ✅ Parsing Cloud Firewall responses
//
// **Forbidden Capabilities**:
// - ❌ Retry logic (owned by SyncEngine)
// - ❌ Group lookup or create-vs-replace decisions (owned by GroupSyncer)
// - ❌ Spawning tasks
//
// ## API Reference
//
// - Version: `2017-12-07`
// - List: `DescribeAddressBook` (paged, `GroupType=ip`)
// - Create: `AddAddressBook`
// - Replace: `ModifyAddressBook` (the address list is overwritten)

use async_trait::async_trait;
use chrono::Utc;
use l2sync_aliyun::credentials::{self, CredentialProvider, CredentialScope};
use l2sync_aliyun::RpcClient;
use l2sync_core::config::{CloudAccountConfig, Config};
use l2sync_core::traits::{AddressBook, AddressBookClient, AddressBookPage};
use l2sync_core::{Error, GroupSyncer, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Cloud Firewall API version
pub const CLOUDFW_API_VERSION: &str = "2017-12-07";

/// Language of API messages
pub const API_LANG: &str = "zh";

const ACTION_DESCRIBE: &str = "DescribeAddressBook";
const ACTION_ADD: &str = "AddAddressBook";
const ACTION_MODIFY: &str = "ModifyAddressBook";

/// Cloud Firewall host for a region
///
/// `cn-hangzhou` is served by the unqualified host.
pub fn endpoint_for_region(region: &str) -> String {
    match region.trim() {
        "cn-hangzhou" => "cloudfw.aliyuncs.com".to_string(),
        region => format!("cloudfw.{region}.aliyuncs.com"),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeAddressBookResponse {
    #[serde(default, deserialize_with = "lenient_count")]
    total_count: usize,
    #[serde(default)]
    acls: Vec<Acl>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Acl {
    #[serde(default)]
    group_uuid: String,
    #[serde(default)]
    group_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    address_list: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddAddressBookResponse {
    #[serde(default)]
    group_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyAddressBookResponse {
    #[serde(default)]
    request_id: Option<String>,
}

/// `TotalCount` arrives as a string on some API versions
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(usize),
        Text(String),
        Missing(Option<()>),
    }

    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(s) if s.trim().is_empty() => Ok(0),
        Count::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Count::Missing(_) => Ok(0),
    }
}

/// Cloud Firewall address book client
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. Every method makes exactly one API call.
#[derive(Debug)]
pub struct CloudFirewallClient {
    client: RpcClient,
}

impl CloudFirewallClient {
    /// Create a client for `region` with resolved credentials
    pub fn new(region: &str, credentials: CredentialProvider) -> Result<Self> {
        Ok(Self {
            client: RpcClient::new(
                "cloudfw",
                endpoint_for_region(region),
                CLOUDFW_API_VERSION,
                credentials,
            )?,
        })
    }

    /// Create a client from the `firewall` config section
    ///
    /// Credentials follow the config → `FIREWALL_*` env → generic env →
    /// credentials file → ECS RAM role chain.
    pub fn from_config(config: &CloudAccountConfig) -> Result<Self> {
        let credentials =
            credentials::resolve(config.explicit_keys(), CredentialScope::Firewall)?;
        let client = Self::new(&config.region, credentials)?;
        tracing::info!(
            region = %config.region,
            host = client.client.host(),
            credentials = %client.client.credential_source(),
            "Cloud Firewall client configured"
        );
        Ok(client)
    }

    /// Send requests to another base URL
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client = self.client.with_endpoint(endpoint);
        self
    }

    /// Signed API host
    pub fn host(&self) -> &str {
        self.client.host()
    }
}

fn params<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[async_trait]
impl AddressBookClient for CloudFirewallClient {
    async fn list_address_books(
        &self,
        page_size: u32,
        page: u32,
        group_type: &str,
    ) -> Result<AddressBookPage> {
        let response: DescribeAddressBookResponse = self
            .client
            .call(
                ACTION_DESCRIBE,
                &params([
                    ("PageSize", page_size.to_string()),
                    ("CurrentPage", page.to_string()),
                    ("GroupType", group_type.to_string()),
                    ("Lang", API_LANG.to_string()),
                ]),
            )
            .await?;

        let now = Utc::now();
        let books = response
            .acls
            .into_iter()
            .map(|acl| AddressBook {
                group_id: acl.group_uuid,
                group_name: acl.group_name,
                description: acl.description,
                entries: acl.address_list.into_iter().flatten().collect(),
                update_time: now,
            })
            .collect();

        Ok(AddressBookPage {
            books,
            total_count: response.total_count,
        })
    }

    async fn create_address_book(
        &self,
        name: &str,
        description: &str,
        ips: &[String],
    ) -> Result<String> {
        let response: AddAddressBookResponse = self
            .client
            .call(
                ACTION_ADD,
                &params([
                    ("GroupName", name.to_string()),
                    ("Description", description.to_string()),
                    ("AddressList", ips.join(",")),
                    ("GroupType", "ip".to_string()),
                    ("AutoAddTagEcs", "false".to_string()),
                    ("TagRelation", "and".to_string()),
                    ("Lang", API_LANG.to_string()),
                ]),
            )
            .await?;

        response
            .group_uuid
            .filter(|uuid| !uuid.is_empty())
            .ok_or_else(|| {
                Error::provider(
                    self.client_name(),
                    format!("{ACTION_ADD} for '{name}' returned no GroupUuid"),
                )
            })
    }

    async fn replace_address_book(
        &self,
        group_id: &str,
        name: &str,
        description: &str,
        ips: &[String],
    ) -> Result<()> {
        let response: ModifyAddressBookResponse = self
            .client
            .call(
                ACTION_MODIFY,
                &params([
                    ("GroupUuid", group_id.to_string()),
                    ("GroupName", name.to_string()),
                    ("Description", description.to_string()),
                    ("AddressList", ips.join(",")),
                    ("Lang", API_LANG.to_string()),
                ]),
            )
            .await?;

        tracing::debug!(
            group = name,
            request_id = response.request_id.as_deref().unwrap_or(""),
            "Address book replaced"
        );
        Ok(())
    }

    fn client_name(&self) -> &'static str {
        "cloudfw"
    }
}

/// Build the group syncer for the configured address groups
pub fn cloud_firewall_syncer(config: &Config) -> Result<GroupSyncer<CloudFirewallClient>> {
    let client = CloudFirewallClient::from_config(&config.firewall)?;
    Ok(GroupSyncer::new(client, &config.sync.address_groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2sync_aliyun::{AccessKey, CredentialSource};
    use l2sync_core::config::AddressGroupSpec;
    use l2sync_core::traits::{AddressBookSyncer, SyncOutcome};
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> CloudFirewallClient {
        CloudFirewallClient::new(
            "ap-southeast-1",
            CredentialProvider::fixed(
                AccessKey::new("test-id", "test-secret"),
                CredentialSource::Config,
            ),
        )
        .unwrap()
        .with_endpoint(server.uri())
    }

    fn acl(uuid: &str, name: &str, ips: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "GroupUuid": uuid,
            "GroupName": name,
            "Description": format!("{name} description"),
            "GroupType": "ip",
            "AddressList": ips,
        })
    }

    #[test]
    fn endpoints_by_region() {
        assert_eq!(
            endpoint_for_region("ap-southeast-1"),
            "cloudfw.ap-southeast-1.aliyuncs.com"
        );
        assert_eq!(endpoint_for_region("cn-hangzhou"), "cloudfw.aliyuncs.com");
        assert_eq!(
            endpoint_for_region("eu-central-1"),
            "cloudfw.eu-central-1.aliyuncs.com"
        );
    }

    #[test]
    fn total_count_accepts_strings_and_numbers() {
        for (body, expected) in [
            (r#"{"TotalCount": 7, "Acls": []}"#, 7),
            (r#"{"TotalCount": "12", "Acls": []}"#, 12),
            (r#"{"TotalCount": "", "Acls": []}"#, 0),
            (r#"{"Acls": []}"#, 0),
        ] {
            let parsed: DescribeAddressBookResponse = serde_json::from_str(body).unwrap();
            assert_eq!(parsed.total_count, expected, "body: {body}");
        }

        let bad = r#"{"TotalCount": "many"}"#;
        assert!(serde_json::from_str::<DescribeAddressBookResponse>(bad).is_err());
    }

    #[tokio::test]
    async fn list_maps_acls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-acs-action", "DescribeAddressBook"))
            .and(header("x-acs-version", "2017-12-07"))
            .and(query_param("PageSize", "50"))
            .and(query_param("CurrentPage", "2"))
            .and(query_param("GroupType", "ip"))
            .and(query_param("Lang", "zh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "RequestId": "req-list",
                "TotalCount": "51",
                "Acls": [acl("uuid-1", "dcdn-all", &["203.0.113.0/24", "198.51.100.7"])]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server)
            .list_address_books(50, 2, "ip")
            .await
            .unwrap();

        assert_eq!(page.total_count, 51);
        assert_eq!(page.books.len(), 1);
        let book = &page.books[0];
        assert_eq!(book.group_id, "uuid-1");
        assert_eq!(book.group_name, "dcdn-all");
        assert_eq!(book.description, "dcdn-all description");
        assert_eq!(book.entries, vec!["203.0.113.0/24", "198.51.100.7"]);
    }

    #[tokio::test]
    async fn create_sends_full_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-acs-action", "AddAddressBook"))
            .and(query_param("GroupName", "dcdn-all"))
            .and(query_param("Description", "DCDN edge nodes"))
            .and(query_param("AddressList", "203.0.113.0/24,198.51.100.7"))
            .and(query_param("GroupType", "ip"))
            .and(query_param("AutoAddTagEcs", "false"))
            .and(query_param("TagRelation", "and"))
            .and(query_param("Lang", "zh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "RequestId": "req-add",
                "GroupUuid": "uuid-new"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uuid = client(&server)
            .create_address_book(
                "dcdn-all",
                "DCDN edge nodes",
                &["203.0.113.0/24".to_string(), "198.51.100.7".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(uuid, "uuid-new");
    }

    #[tokio::test]
    async fn create_without_uuid_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"RequestId": "r"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .create_address_book("dcdn-all", "", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn replace_sends_modify() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-acs-action", "ModifyAddressBook"))
            .and(query_param("GroupUuid", "uuid-1"))
            .and(query_param("GroupName", "dcdn-all"))
            .and(query_param("Description", "DCDN edge nodes"))
            .and(query_param("AddressList", "192.0.2.1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"RequestId": "req-mod"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server)
            .replace_address_book(
                "uuid-1",
                "dcdn-all",
                "DCDN edge nodes",
                &["192.0.2.1".to_string()],
            )
            .await;
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn syncer_finds_group_on_second_page_and_replaces_it() {
        let server = MockServer::start().await;
        let first_page: Vec<_> = (0..2)
            .map(|i| acl(&format!("uuid-{i}"), &format!("other-{i}"), &["10.0.0.1"]))
            .collect();

        Mock::given(method("POST"))
            .and(header("x-acs-action", "DescribeAddressBook"))
            .and(query_param("CurrentPage", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "TotalCount": 3,
                "Acls": first_page
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-acs-action", "DescribeAddressBook"))
            .and(query_param("CurrentPage", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "TotalCount": 3,
                "Acls": [acl("uuid-target", "dcdn-all", &["192.0.2.1"])]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-acs-action", "ModifyAddressBook"))
            .and(query_param("GroupUuid", "uuid-target"))
            .and(query_param("AddressList", "192.0.2.1,192.0.2.2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"RequestId": "r"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let groups = [AddressGroupSpec::new("dcdn-all").with_description("DCDN edge nodes")];
        let syncer = GroupSyncer::new(client(&server), &groups).with_page_size(2);

        let outcome = syncer
            .sync_address_book(
                "dcdn-all",
                &["192.0.2.1".to_string(), "192.0.2.2".to_string()],
            )
            .await
            .unwrap();

        assert!(
            matches!(
                outcome,
                SyncOutcome::Replaced { ref group_id, entries: 2, .. } if group_id == "uuid-target"
            ),
            "got {outcome:?}"
        );
    }

    #[tokio::test]
    async fn syncer_creates_missing_group() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-acs-action", "DescribeAddressBook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "TotalCount": "0",
                "Acls": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("x-acs-action", "AddAddressBook"))
            .and(query_param("GroupName", "dcdn-all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "GroupUuid": "uuid-created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let groups = [AddressGroupSpec::new("dcdn-all")];
        let syncer = GroupSyncer::new(client(&server), &groups);

        let outcome = syncer
            .sync_address_book("dcdn-all", &["203.0.113.0/24".to_string()])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Created {
                group_id: "uuid-created".to_string(),
                entries: 1
            }
        );
    }

    #[test]
    fn from_config_uses_region_endpoint() {
        let config = CloudAccountConfig {
            access_key_id: Some("cfg-id".to_string()),
            access_key_secret: Some("cfg-secret".to_string()),
            region: "cn-hangzhou".to_string(),
        };

        let client = CloudFirewallClient::from_config(&config).unwrap();
        assert_eq!(client.host(), "cloudfw.aliyuncs.com");
        assert!(!format!("{client:?}").contains("cfg-secret"));
    }
}
