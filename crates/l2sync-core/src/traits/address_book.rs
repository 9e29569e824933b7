// # Address Book Traits
//
// Two layers describe the firewall side:
//
// - `AddressBookClient` is the raw remote API: paginated listing, create,
//   and full replace. Vendor crates implement it.
//   (`l2sync-provider-cloudfw` for Alibaba Cloud Cloud Firewall)
// - `AddressBookSyncer` is what the engine calls: exact-name lookup and
//   create-or-replace of one group. `GroupSyncer` implements it on top of
//   any `AddressBookClient`.
//
// ## Usage
//
// ```rust,ignore
// use l2sync_core::{AddressBookSyncer, GroupSyncer};
//
// let syncer = GroupSyncer::new(client, &config.sync.address_groups);
// let outcome = syncer
//     .sync_address_book("dcdn-source-ips-v4", &["203.0.113.0/24".to_string()])
//     .await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Address book as mirrored from the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBook {
    /// Remote identity key
    pub group_id: String,
    /// Group name (unique on the remote by convention, not by guarantee)
    pub group_name: String,
    /// Description
    pub description: String,
    /// Current members
    pub entries: Vec<String>,
    /// When this snapshot was taken
    pub update_time: DateTime<Utc>,
}

/// One page of an address book listing
#[derive(Debug, Clone, Default)]
pub struct AddressBookPage {
    /// Books on this page
    pub books: Vec<AddressBook>,
    /// Total number of books across all pages
    pub total_count: usize,
}

/// Result of syncing one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The group did not exist and was created
    Created {
        /// Remote identity of the new group
        group_id: String,
        /// Number of entries pushed
        entries: usize,
    },
    /// The group existed and its list was fully replaced
    Replaced {
        /// Remote identity of the group
        group_id: String,
        /// Number of entries pushed
        entries: usize,
        /// Entries present now but not before
        added: usize,
        /// Entries present before but not now
        removed: usize,
    },
}

impl SyncOutcome {
    /// Number of entries pushed
    pub fn entries(&self) -> usize {
        match self {
            Self::Created { entries, .. } | Self::Replaced { entries, .. } => *entries,
        }
    }
}

/// Raw address book API
///
/// # Contract
///
/// - Every method is a single remote call. Retries are owned by the
///   engine.
/// - `list_address_books` pages are 1-based.
/// - `replace_address_book` overwrites the whole list; it is never a merge.
#[async_trait]
pub trait AddressBookClient: Send + Sync {
    /// List one page of address books of `group_type`
    async fn list_address_books(
        &self,
        page_size: u32,
        page: u32,
        group_type: &str,
    ) -> Result<AddressBookPage, crate::Error>;

    /// Create an address book and return its identity key
    async fn create_address_book(
        &self,
        name: &str,
        description: &str,
        ips: &[String],
    ) -> Result<String, crate::Error>;

    /// Replace the full member list of an existing address book
    async fn replace_address_book(
        &self,
        group_id: &str,
        name: &str,
        description: &str,
        ips: &[String],
    ) -> Result<(), crate::Error>;

    /// Get the client name (for logging/debugging)
    fn client_name(&self) -> &'static str;
}

/// Group-level syncing used by the engine
///
/// # Contract
///
/// - `get_by_name` is an exact match that scans every page.
/// - `sync_address_book` creates the group when absent and fully replaces
///   its list when present.
/// - Implementations re-validate each IP and silently skip anything that is
///   not a bare IPv4 address or IPv4 CIDR block.
#[async_trait]
pub trait AddressBookSyncer: Send + Sync {
    /// Find an address book by exact name
    async fn get_by_name(&self, group_name: &str) -> Result<Option<AddressBook>, crate::Error>;

    /// Make the named group contain exactly `ips`
    async fn sync_address_book(
        &self,
        group_name: &str,
        ips: &[String],
    ) -> Result<SyncOutcome, crate::Error>;

    /// Get the syncer name (for logging/debugging)
    fn syncer_name(&self) -> &'static str;
}
