//! In-memory record of one sync pass
//!
//! A [`SyncTask`] is created when a pass starts, mutated by the engine as
//! the pass progresses, and finalized at the end. It is never persisted;
//! its final state is logged and handed back to the caller.

use crate::traits::SyncOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Lifecycle status of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Pass in progress
    Running,
    /// Every group synced
    Completed,
    /// At least one group failed
    CompletedWithErrors,
    /// Source fetch failed, no group was attempted
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of one group within a pass
#[derive(Debug, Clone, Serialize)]
pub struct GroupResult {
    /// Group name
    pub group_name: String,
    /// Number of IPs selected for the group
    pub ip_count: usize,
    /// Remote calls made, including retries
    pub attempts: u32,
    /// What the syncer did, on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    /// Why the group failed, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GroupResult {
    /// Whether the group synced
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Record of one sync pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncTask {
    /// Unique task identifier (`sync_<unix>_<suffix>`)
    pub task_id: String,
    /// Current status
    pub status: TaskStatus,
    /// When the pass started
    pub start_time: DateTime<Utc>,
    /// When the pass finished
    pub end_time: Option<DateTime<Utc>>,
    /// Raw IPs returned by the source
    pub source_ips: Vec<String>,
    /// IPs pushed by successful groups, de-duplicated once finalized
    pub added_ips: Vec<String>,
    /// First error of the pass
    pub error_msg: Option<String>,
    /// Per-group results in processing order
    pub groups: Vec<GroupResult>,
}

impl SyncTask {
    /// Start a new task record
    pub fn new() -> Self {
        let start_time = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            task_id: format!("sync_{}_{}", start_time.timestamp(), &suffix[..8]),
            status: TaskStatus::Running,
            start_time,
            end_time: None,
            source_ips: Vec::new(),
            added_ips: Vec::new(),
            error_msg: None,
            groups: Vec::new(),
        }
    }

    /// Mark the whole pass failed (source fetch path)
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error_msg = Some(message.into());
        self.end_time = Some(Utc::now());
    }

    /// Record a group that synced
    pub fn record_group_success(
        &mut self,
        group_name: &str,
        ips: Vec<String>,
        outcome: SyncOutcome,
        attempts: u32,
    ) {
        self.groups.push(GroupResult {
            group_name: group_name.to_string(),
            ip_count: ips.len(),
            attempts,
            outcome: Some(outcome),
            error: None,
        });
        self.added_ips.extend(ips);
    }

    /// Record a group that failed; the first error message is kept
    pub fn record_group_failure(
        &mut self,
        group_name: &str,
        ip_count: usize,
        error: impl Into<String>,
        attempts: u32,
    ) {
        let error = error.into();
        if self.error_msg.is_none() {
            self.error_msg = Some(error.clone());
        }
        self.groups.push(GroupResult {
            group_name: group_name.to_string(),
            ip_count,
            attempts,
            outcome: None,
            error: Some(error),
        });
    }

    /// Resolve the final status, de-duplicate `added_ips`, stamp the end time
    ///
    /// A task already marked failed keeps that status.
    pub fn finalize(&mut self) {
        self.added_ips = dedup_preserving_order(std::mem::take(&mut self.added_ips));

        if self.status != TaskStatus::Failed {
            self.status = if self.groups.iter().all(GroupResult::is_success) {
                TaskStatus::Completed
            } else {
                TaskStatus::CompletedWithErrors
            };
        }

        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    /// Elapsed time, once the task has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Number of groups that failed
    pub fn failed_groups(&self) -> usize {
        self.groups.iter().filter(|g| !g.is_success()).count()
    }

    /// Compact view for status reporting
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            source_count: self.source_ips.len(),
            added_count: self.added_ips.len(),
            failed_groups: self.failed_groups(),
            error_msg: self.error_msg.clone(),
        }
    }
}

impl Default for SyncTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Compact view of a finished task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    /// Task identifier
    pub task_id: String,
    /// Final status
    pub status: TaskStatus,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// End time
    pub end_time: Option<DateTime<Utc>>,
    /// Number of raw source IPs
    pub source_count: usize,
    /// Number of distinct IPs pushed
    pub added_count: usize,
    /// Number of failed groups
    pub failed_groups: usize,
    /// First error
    pub error_msg: Option<String>,
}

/// Remove duplicates, keeping the first occurrence of each entry
pub fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
