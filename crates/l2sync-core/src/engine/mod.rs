//! Sync engine
//!
//! The SyncEngine executes one complete pass:
//! - Fetch the edge-node IP list once via SourceIpProvider
//! - Normalize it to IPv4 entries
//! - Filter it per address group
//! - Push each group via AddressBookSyncer
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ SourceIpProvider │─── fetch() (once per pass) ───┐
//! └──────────────────┘                               │
//!                                                    ▼
//!                                           ┌──────────────┐
//!                                           │  SyncEngine  │── normalize → filter
//!                                           └──────────────┘
//!                                                    │
//!                                 per group, in configuration order
//!                                                    ▼
//!                                        ┌───────────────────┐
//!                                        │ AddressBookSyncer │
//!                                        └───────────────────┘
//! ```
//!
//! ## Failure Handling
//!
//! 1. Fetch failure ends the pass with status `failed`; no group is touched
//! 2. A group failure is recorded and the next group still runs
//! 3. Transient errors are retried per [`RetryPolicy`]
//! 4. The pass deadline bounds every remote call and every retry sleep

pub mod retry;

pub use retry::{Attempted, RetryPolicy};

use crate::config::{AddressGroupSpec, Config, IpType};
use crate::error::{Error, Result};
use crate::filter::filter_group;
use crate::normalize::{NormalizedIp, normalize};
use crate::task::SyncTask;
use crate::traits::{AddressBookSyncer, SourceIpProvider, SourceIpRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Executes sync passes
///
/// ## Threading
///
/// The engine holds no per-pass state; each call to
/// [`execute_pass`](Self::execute_pass) builds its own [`SyncTask`]. It is
/// shared between the scheduler loop and pass tasks behind an `Arc`.
pub struct SyncEngine {
    /// Source of edge-node IPs
    source: Arc<dyn SourceIpProvider>,

    /// Address book target
    syncer: Arc<dyn AddressBookSyncer>,

    /// Address groups, in configuration order
    groups: Vec<AddressGroupSpec>,

    /// Retry policy for remote calls
    retry: RetryPolicy,

    /// Deadline for a whole pass
    pass_timeout: Option<Duration>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `source`: Source IP implementation
    /// - `syncer`: Address book implementation
    /// - `config`: Validated configuration
    pub fn new(
        source: Arc<dyn SourceIpProvider>,
        syncer: Arc<dyn AddressBookSyncer>,
        config: &Config,
    ) -> Result<Self> {
        config.sync.validate()?;
        config.scheduler.validate()?;

        for group in &config.sync.address_groups {
            if group.ip_type == IpType::Ipv6 {
                warn!(
                    group = %group.group_name,
                    "Address group is tagged ipv6 but only IPv4 entries are synced"
                );
            }
        }

        Ok(Self {
            source,
            syncer,
            groups: config.sync.address_groups.clone(),
            retry: RetryPolicy::new(
                config.scheduler.max_retries,
                config.scheduler.retry_delay_duration()?,
            ),
            pass_timeout: config.scheduler.timeout_duration()?,
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the pass deadline
    pub fn with_pass_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pass_timeout = timeout;
        self
    }

    /// Configured address groups
    pub fn groups(&self) -> &[AddressGroupSpec] {
        &self.groups
    }

    /// Execute one full pass and return its finalized record
    pub async fn execute_pass(&self) -> SyncTask {
        let mut task = SyncTask::new();
        let deadline = self.pass_timeout.map(|timeout| Instant::now() + timeout);

        info!(
            task_id = %task.task_id,
            groups = self.groups.len(),
            source = self.source.provider_name(),
            syncer = self.syncer.syncer_name(),
            "Sync pass started"
        );

        let fetched = self
            .retry
            .run("fetch source IPs", deadline, || self.source.fetch())
            .await;

        let records = match fetched.result {
            Ok(records) => records,
            Err(e) => {
                let err = Error::fetch(format!(
                    "{} (after {} attempt(s)): {}",
                    self.source.provider_name(),
                    fetched.attempts,
                    e
                ));
                error!(task_id = %task.task_id, error = %err, "Sync pass failed");
                task.fail(err.to_string());
                return task;
            }
        };

        task.source_ips = records.iter().map(|r| r.ip.clone()).collect();
        let ipv4 = ipv4_records(records);
        info!(
            task_id = %task.task_id,
            fetched = task.source_ips.len(),
            ipv4 = ipv4.len(),
            "Fetched source IPs"
        );

        for group in &self.groups {
            let selected = filter_group(&ipv4, group);
            let ips: Vec<String> = selected.into_iter().map(|r| r.ip).collect();
            debug!(group = %group.group_name, selected = ips.len(), "Filtered address group");

            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                let err = Error::group_sync(
                    &group.group_name,
                    "pass deadline exceeded before the group was synced",
                );
                warn!(error = %err, "Skipping address group");
                task.record_group_failure(&group.group_name, ips.len(), err.to_string(), 0);
                continue;
            }

            let operation = format!("sync address group {}", group.group_name);
            let attempted = self
                .retry
                .run(&operation, deadline, || {
                    self.syncer.sync_address_book(&group.group_name, &ips)
                })
                .await;

            match attempted.result {
                Ok(outcome) => {
                    info!(
                        group = %group.group_name,
                        entries = outcome.entries(),
                        attempts = attempted.attempts,
                        "Address group synced"
                    );
                    task.record_group_success(
                        &group.group_name,
                        ips,
                        outcome,
                        attempted.attempts,
                    );
                }
                Err(e) => {
                    let err = Error::group_sync(&group.group_name, e.to_string());
                    error!(attempts = attempted.attempts, error = %err, "Address group failed");
                    task.record_group_failure(
                        &group.group_name,
                        ips.len(),
                        err.to_string(),
                        attempted.attempts,
                    );
                }
            }
        }

        task.finalize();
        let elapsed_ms = task.duration().map(|d| d.num_milliseconds()).unwrap_or(0);
        info!(
            task_id = %task.task_id,
            status = %task.status,
            added = task.added_ips.len(),
            failed_groups = task.failed_groups(),
            elapsed_ms,
            "Sync pass finished"
        );

        task
    }
}

/// Keep IPv4 records, rewriting each IP to its canonical form
fn ipv4_records(records: Vec<SourceIpRecord>) -> Vec<SourceIpRecord> {
    records
        .into_iter()
        .filter_map(|mut record| match normalize(&record.ip) {
            NormalizedIp::V4(canonical) => {
                record.ip = canonical;
                Some(record)
            }
            NormalizedIp::NotV4(_) => {
                debug!(ip = %record.ip, "Dropping non-IPv4 source entry");
                None
            }
            NormalizedIp::Invalid => {
                debug!(ip = %record.ip, "Dropping unparseable source entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_records_canonicalizes_and_drops() {
        let records = vec![
            SourceIpRecord::new("203.0.113.9/24"),
            SourceIpRecord::new("2001:db8::1"),
            SourceIpRecord::new("garbage"),
            SourceIpRecord::new("8.8.4.4"),
        ];

        let kept: Vec<String> = ipv4_records(records).into_iter().map(|r| r.ip).collect();
        assert_eq!(kept, vec!["203.0.113.0/24", "8.8.4.4"]);
    }
}
