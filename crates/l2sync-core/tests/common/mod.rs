//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call so tests can assert on what reached the
//! collaborators, without any network access.

#![allow(dead_code)]

use async_trait::async_trait;
use l2sync_core::config::{AddressGroupSpec, Config, SchedulerConfig, SyncConfig};
use l2sync_core::error::{Error, Result};
use l2sync_core::traits::{
    AddressBook, AddressBookSyncer, SourceIpProvider, SourceIpRecord, SyncOutcome,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How a mock call should fail
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Retryable (HTTP 503 style)
    Transient,
    /// Not retryable (bad credentials)
    Permanent,
}

impl Failure {
    fn to_error(self, what: &str) -> Error {
        match self {
            Self::Transient => Error::http(format!("{what}: 503 Service Unavailable")),
            Self::Permanent => Error::auth(format!("{what}: InvalidAccessKeyId")),
        }
    }
}

/// A SourceIpProvider returning a fixed list
pub struct MockSourceIpProvider {
    ips: Vec<String>,
    /// Number of leading calls that fail
    failures: usize,
    failure: Failure,
    delay: Duration,
    fetch_call_count: Arc<AtomicUsize>,
}

impl MockSourceIpProvider {
    pub fn new(ips: &[&str]) -> Self {
        Self {
            ips: ips.iter().map(|s| s.to_string()).collect(),
            failures: 0,
            failure: Failure::Transient,
            delay: Duration::ZERO,
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every call
    pub fn failing(failure: Failure) -> Self {
        Self::new(&[]).failing_first(usize::MAX, failure)
    }

    /// Fail the first `count` calls, then succeed
    pub fn failing_first(mut self, count: usize, failure: Failure) -> Self {
        self.failures = count;
        self.failure = failure;
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Get the number of times fetch() was called
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    /// Create a new provider that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            ips: other.ips.clone(),
            failures: other.failures,
            failure: other.failure,
            delay: other.delay,
            fetch_call_count: Arc::clone(&other.fetch_call_count),
        }
    }
}

#[async_trait]
impl SourceIpProvider for MockSourceIpProvider {
    async fn fetch(&self) -> Result<Vec<SourceIpRecord>> {
        let call = self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call < self.failures {
            return Err(self.failure.to_error("DescribeDcdnL2Ips"));
        }
        Ok(self
            .ips
            .iter()
            .map(|ip| SourceIpRecord::new(ip.as_str()))
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "mock-source"
    }
}

/// A recording AddressBookSyncer backed by an in-memory book per group
pub struct MockSyncer {
    /// Recorded (group, ips) per sync call, in call order
    calls: Arc<std::sync::Mutex<Vec<(String, Vec<String>)>>>,
    /// Current remote content per group
    books: Arc<std::sync::Mutex<HashMap<String, Vec<String>>>>,
    failing_groups: HashSet<String>,
    failure: Failure,
    delay: Duration,
    sync_call_count: Arc<AtomicUsize>,
}

impl MockSyncer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
            books: Arc::new(std::sync::Mutex::new(HashMap::new())),
            failing_groups: HashSet::new(),
            failure: Failure::Transient,
            delay: Duration::ZERO,
            sync_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every sync of `group` fails
    pub fn failing_group(mut self, group: &str, failure: Failure) -> Self {
        self.failing_groups.insert(group.to_string());
        self.failure = failure;
        self
    }

    /// Sleep before answering each sync
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Get the number of times sync_address_book() was called
    pub fn sync_call_count(&self) -> usize {
        self.sync_call_count.load(Ordering::SeqCst)
    }

    /// Recorded sync calls
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Remote content of one group
    pub fn book(&self, group: &str) -> Option<Vec<String>> {
        self.books.lock().unwrap().get(group).cloned()
    }

    /// Create a new syncer that shares counters and books with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            calls: Arc::clone(&other.calls),
            books: Arc::clone(&other.books),
            failing_groups: other.failing_groups.clone(),
            failure: other.failure,
            delay: other.delay,
            sync_call_count: Arc::clone(&other.sync_call_count),
        }
    }
}

#[async_trait]
impl AddressBookSyncer for MockSyncer {
    async fn get_by_name(&self, group_name: &str) -> Result<Option<AddressBook>> {
        Ok(self.book(group_name).map(|entries| AddressBook {
            group_id: format!("uuid-{group_name}"),
            group_name: group_name.to_string(),
            description: String::new(),
            entries,
            update_time: chrono::Utc::now(),
        }))
    }

    async fn sync_address_book(&self, group_name: &str, ips: &[String]) -> Result<SyncOutcome> {
        self.sync_call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((group_name.to_string(), ips.to_vec()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_groups.contains(group_name) {
            return Err(self.failure.to_error("ModifyAddressBook"));
        }

        let previous = self
            .books
            .lock()
            .unwrap()
            .insert(group_name.to_string(), ips.to_vec());
        let group_id = format!("uuid-{group_name}");
        Ok(match previous {
            None => SyncOutcome::Created {
                group_id,
                entries: ips.len(),
            },
            Some(_) => SyncOutcome::Replaced {
                group_id,
                entries: ips.len(),
                added: 0,
                removed: 0,
            },
        })
    }

    fn syncer_name(&self) -> &'static str {
        "mock-syncer"
    }
}

/// Config with the given groups and fast retries
pub fn config_with_groups(groups: Vec<AddressGroupSpec>) -> Config {
    Config {
        scheduler: SchedulerConfig {
            retry_delay: "1ms".to_string(),
            ..SchedulerConfig::default()
        },
        sync: SyncConfig {
            address_groups: groups,
        },
        ..Config::default()
    }
}

/// One catch-all group
pub fn minimal_config() -> Config {
    config_with_groups(vec![AddressGroupSpec::new("dcdn-all")])
}

/// The two groups of the reference end-to-end scenario
pub fn reference_groups() -> Vec<AddressGroupSpec> {
    vec![
        AddressGroupSpec::new("v4-all")
            .with_include(["*"])
            .with_exclude(["10.*", "192.168.*"]),
        AddressGroupSpec::new("v4-strict").with_include(["203.0.*"]),
    ]
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
