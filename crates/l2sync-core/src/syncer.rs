//! Create-or-replace syncing of address groups
//!
//! [`GroupSyncer`] turns any [`AddressBookClient`] into an
//! [`AddressBookSyncer`]:
//!
//! 1. Re-validate the requested IPs (IPv4 and IPv4 CIDR only).
//! 2. Look the group up by exact name, scanning every listing page.
//! 3. Create it when absent, otherwise replace its whole list.
//!
//! The difference against the current remote list is computed for logging
//! only; the remote call always carries the full list.

use crate::config::AddressGroupSpec;
use crate::error::{Error, Result};
use crate::normalize::ipv4_only;
use crate::traits::{AddressBook, AddressBookClient, AddressBookSyncer, SyncOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Listing page size
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Group type of IP address books
pub const GROUP_TYPE_IP: &str = "ip";

/// Upper bound on listing pages scanned in one lookup
const MAX_PAGES: u32 = 1000;

/// [`AddressBookSyncer`] over a raw [`AddressBookClient`]
pub struct GroupSyncer<C> {
    client: C,
    descriptions: HashMap<String, String>,
    page_size: u32,
}

impl<C: AddressBookClient> GroupSyncer<C> {
    /// Create a syncer for the configured groups
    ///
    /// Descriptions are taken from `groups`; a sync request for a group not
    /// in this list fails.
    pub fn new(client: C, groups: &[AddressGroupSpec]) -> Self {
        let descriptions = groups
            .iter()
            .map(|g| (g.group_name.clone(), g.description.clone()))
            .collect();

        Self {
            client,
            descriptions,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the listing page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Access the underlying client
    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: AddressBookClient> AddressBookSyncer for GroupSyncer<C> {
    async fn get_by_name(&self, group_name: &str) -> Result<Option<AddressBook>> {
        let mut scanned = 0usize;

        for page in 1..=MAX_PAGES {
            let listing = self
                .client
                .list_address_books(self.page_size, page, GROUP_TYPE_IP)
                .await?;

            debug!(
                page,
                books = listing.books.len(),
                total = listing.total_count,
                "Scanned address book page"
            );

            if listing.books.is_empty() {
                return Ok(None);
            }
            scanned += listing.books.len();

            if let Some(book) = listing
                .books
                .into_iter()
                .find(|book| book.group_name == group_name)
            {
                return Ok(Some(book));
            }

            if scanned >= listing.total_count {
                return Ok(None);
            }
        }

        Err(Error::provider(
            self.client.client_name(),
            format!("address book listing exceeded {MAX_PAGES} pages"),
        ))
    }

    async fn sync_address_book(&self, group_name: &str, ips: &[String]) -> Result<SyncOutcome> {
        let description = self.descriptions.get(group_name).ok_or_else(|| {
            Error::config(format!("address group '{group_name}' is not configured"))
        })?;

        let entries = ipv4_only(ips.iter().map(String::as_str));
        if entries.len() != ips.len() {
            debug!(
                group = group_name,
                skipped = ips.len() - entries.len(),
                "Dropped entries that failed re-validation"
            );
        }

        match self.get_by_name(group_name).await? {
            None => {
                let group_id = self
                    .client
                    .create_address_book(group_name, description, &entries)
                    .await?;
                info!(
                    group = group_name,
                    group_id = %group_id,
                    entries = entries.len(),
                    "Created address book"
                );
                Ok(SyncOutcome::Created {
                    group_id,
                    entries: entries.len(),
                })
            }
            Some(existing) => {
                let (added, removed) = diff_counts(&existing.entries, &entries);
                self.client
                    .replace_address_book(&existing.group_id, group_name, description, &entries)
                    .await?;
                info!(
                    group = group_name,
                    group_id = %existing.group_id,
                    entries = entries.len(),
                    added,
                    removed,
                    "Replaced address book"
                );
                Ok(SyncOutcome::Replaced {
                    group_id: existing.group_id,
                    entries: entries.len(),
                    added,
                    removed,
                })
            }
        }
    }

    fn syncer_name(&self) -> &'static str {
        self.client.client_name()
    }
}

/// Count entries only in `new` and entries only in `existing`
fn diff_counts(existing: &[String], new: &[String]) -> (usize, usize) {
    let before: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let after: HashSet<&str> = new.iter().map(String::as_str).collect();
    (after.difference(&before).count(), before.difference(&after).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::AddressBookPage;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        List(u32),
        Create(String, String, Vec<String>),
        Replace(String, String, Vec<String>),
    }

    /// In-memory address book API with fixed-size pages
    struct FakeClient {
        books: Mutex<Vec<AddressBook>>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeClient {
        fn with_books(names: &[&str]) -> Self {
            let books = names
                .iter()
                .enumerate()
                .map(|(i, name)| AddressBook {
                    group_id: format!("uuid-{i}"),
                    group_name: name.to_string(),
                    description: String::new(),
                    entries: vec!["1.1.1.1".to_string()],
                    update_time: Utc::now(),
                })
                .collect();
            Self {
                books: Mutex::new(books),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AddressBookClient for FakeClient {
        async fn list_address_books(
            &self,
            page_size: u32,
            page: u32,
            _group_type: &str,
        ) -> Result<AddressBookPage> {
            self.calls.lock().unwrap().push(Call::List(page));
            let books = self.books.lock().unwrap();
            let start = ((page - 1) * page_size) as usize;
            Ok(AddressBookPage {
                books: books
                    .iter()
                    .skip(start)
                    .take(page_size as usize)
                    .cloned()
                    .collect(),
                total_count: books.len(),
            })
        }

        async fn create_address_book(
            &self,
            name: &str,
            description: &str,
            ips: &[String],
        ) -> Result<String> {
            self.calls.lock().unwrap().push(Call::Create(
                name.to_string(),
                description.to_string(),
                ips.to_vec(),
            ));
            let mut books = self.books.lock().unwrap();
            let id = format!("uuid-{}", books.len());
            books.push(AddressBook {
                group_id: id.clone(),
                group_name: name.to_string(),
                description: description.to_string(),
                entries: ips.to_vec(),
                update_time: Utc::now(),
            });
            Ok(id)
        }

        async fn replace_address_book(
            &self,
            group_id: &str,
            name: &str,
            _description: &str,
            ips: &[String],
        ) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Replace(
                group_id.to_string(),
                name.to_string(),
                ips.to_vec(),
            ));
            let mut books = self.books.lock().unwrap();
            if let Some(book) = books.iter_mut().find(|b| b.group_id == group_id) {
                book.entries = ips.to_vec();
            }
            Ok(())
        }

        fn client_name(&self) -> &'static str {
            "fake"
        }
    }

    fn groups(names: &[&str]) -> Vec<AddressGroupSpec> {
        names
            .iter()
            .map(|n| AddressGroupSpec::new(*n).with_description(format!("{n} desc")))
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn lookup_scans_all_pages() {
        let client = FakeClient::with_books(&["a", "b", "c", "d", "e"]);
        let syncer = GroupSyncer::new(client, &groups(&["e"])).with_page_size(2);

        let book = syncer.get_by_name("e").await.unwrap().unwrap();
        assert_eq!(book.group_id, "uuid-4");
        assert_eq!(
            syncer.client().calls(),
            vec![Call::List(1), Call::List(2), Call::List(3)]
        );
    }

    #[tokio::test]
    async fn lookup_is_exact_and_stops_at_total() {
        let client = FakeClient::with_books(&["dcdn-v4-old", "dcdn", "x"]);
        let syncer = GroupSyncer::new(client, &groups(&["dcdn-v4"])).with_page_size(2);

        assert!(syncer.get_by_name("dcdn-v4").await.unwrap().is_none());
        assert_eq!(syncer.client().calls(), vec![Call::List(1), Call::List(2)]);
    }

    #[tokio::test]
    async fn absent_group_is_created_with_description() {
        let syncer = GroupSyncer::new(FakeClient::with_books(&[]), &groups(&["v4"]));

        let outcome = syncer
            .sync_address_book("v4", &strings(&["8.8.8.8", "10.0.0.1/24"]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Created {
                group_id: "uuid-0".to_string(),
                entries: 2
            }
        );
        assert_eq!(
            syncer.client().calls().last().unwrap(),
            &Call::Create(
                "v4".to_string(),
                "v4 desc".to_string(),
                strings(&["8.8.8.8", "10.0.0.0/24"])
            )
        );
    }

    #[tokio::test]
    async fn present_group_is_fully_replaced() {
        let syncer = GroupSyncer::new(FakeClient::with_books(&["v4"]), &groups(&["v4"]));

        let outcome = syncer
            .sync_address_book("v4", &strings(&["2.2.2.2", "3.3.3.3"]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                group_id: "uuid-0".to_string(),
                entries: 2,
                added: 2,
                removed: 1
            }
        );
        assert_eq!(
            syncer.client().calls().last().unwrap(),
            &Call::Replace(
                "uuid-0".to_string(),
                "v4".to_string(),
                strings(&["2.2.2.2", "3.3.3.3"])
            )
        );
    }

    #[tokio::test]
    async fn invalid_entries_skipped_before_push() {
        let syncer = GroupSyncer::new(FakeClient::with_books(&[]), &groups(&["v4"]));

        syncer
            .sync_address_book("v4", &strings(&["junk", "::1", "4.4.4.4", "fc00::/7"]))
            .await
            .unwrap();

        match syncer.client().calls().last().unwrap() {
            Call::Create(_, _, ips) => assert_eq!(ips, &strings(&["4.4.4.4"])),
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unconfigured_group_rejected() {
        let syncer = GroupSyncer::new(FakeClient::with_books(&[]), &groups(&["v4"]));

        let err = syncer
            .sync_address_book("other", &strings(&["1.1.1.1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(syncer.client().calls().is_empty());
    }

    #[test]
    fn diff_counts_ignores_order() {
        let (added, removed) = diff_counts(
            &strings(&["1.1.1.1", "2.2.2.2"]),
            &strings(&["2.2.2.2", "1.1.1.1"]),
        );
        assert_eq!((added, removed), (0, 0));
    }
}
