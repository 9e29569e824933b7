//! Pass scheduler
//!
//! The Scheduler drives [`SyncEngine::execute_pass`] on a cron expression or
//! a fixed interval and owns the start/stop lifecycle.
//!
//! ## State Machine
//!
//! ```text
//! ┌──────┐  start()  ┌─────────┐  stop()  ┌─────────┐
//! │ Idle │──────────▶│ Running │─────────▶│ Stopped │
//! └──────┘           └─────────┘          └─────────┘
//!     │                                        ▲
//!     └──────────────── stop() ────────────────┘
//! ```
//!
//! `Running` is either cron driven or interval driven, chosen at start.
//!
//! ## Concurrency
//!
//! - One scheduling loop waits on "next tick or cancellation"
//! - Passes run on spawned tasks behind a skip-if-running guard: a trigger
//!   that arrives while a pass is in flight is skipped and counted
//! - Cancellation travels over a `watch` channel; `start()` returns only
//!   after the in-flight pass has finished

pub mod cron;

pub use cron::CronSchedule;

use crate::config::SchedulerConfig;
use crate::duration::parse_duration;
use crate::engine::SyncEngine;
use crate::error::{Error, Result};
use crate::task::{SyncTask, TaskSummary};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`Scheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Created, not started
    Idle,
    /// Scheduling loop active
    Running,
    /// Terminal
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How passes are triggered while running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Fires on matching seconds of a cron expression
    CronDriven,
    /// Fires on a repeating timer
    IntervalDriven,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// Lifecycle state
    pub state: SchedulerState,
    /// Trigger mode, once started
    pub mode: Option<ScheduleMode>,
    /// Whether a pass is in flight
    pub pass_running: bool,
    /// Next scheduled trigger
    pub next_run: Option<DateTime<Utc>>,
    /// Passes started (scheduled, startup and manual)
    pub passes_started: u64,
    /// Triggers skipped because a pass was in flight
    pub passes_skipped: u64,
    /// Summary of the most recent finished pass
    pub last_task: Option<TaskSummary>,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            mode: None,
            pass_running: false,
            next_run: None,
            passes_started: 0,
            passes_skipped: 0,
            last_task: None,
        }
    }
}

/// Parsed trigger schedule
#[derive(Debug, Clone)]
enum Schedule {
    Interval(Duration),
    Cron(CronSchedule),
}

impl Schedule {
    fn from_config(config: &SchedulerConfig) -> Result<Self> {
        if let Some(expr) = config.cron_expression() {
            return Ok(Self::Cron(CronSchedule::parse(expr)?));
        }

        let period = parse_duration(&config.interval)
            .map_err(|e| Error::setup(format!("scheduler.interval: {e}")))?;
        if period.is_zero() {
            return Err(Error::setup("scheduler.interval must be positive"));
        }
        Ok(Self::Interval(period))
    }

    fn mode(&self) -> ScheduleMode {
        match self {
            Self::Interval(_) => ScheduleMode::IntervalDriven,
            Self::Cron(_) => ScheduleMode::CronDriven,
        }
    }
}

/// State shared between the scheduler, its handles and pass tasks
struct Shared {
    status: Mutex<SchedulerStatus>,
    shutdown_tx: watch::Sender<bool>,
    pass_guard: Arc<tokio::sync::Mutex<()>>,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, SchedulerStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_stop(&self) {
        let already = self.shutdown_tx.send_replace(true);
        let mut status = self.status();
        if status.state == SchedulerState::Idle {
            status.state = SchedulerState::Stopped;
        }
        if !already {
            info!(state = %status.state, "Scheduler stop requested");
        }
    }

    fn begin_pass(&self) {
        let mut status = self.status();
        status.pass_running = true;
        status.passes_started += 1;
    }

    fn finish_pass(&self, task: Option<&SyncTask>) {
        let mut status = self.status();
        status.pass_running = false;
        if let Some(task) = task {
            status.last_task = Some(task.summary());
        }
    }

    fn record_skip(&self, trigger: &str) {
        let skipped = {
            let mut status = self.status();
            status.passes_skipped += 1;
            status.passes_skipped
        };
        warn!(trigger, skipped, "Sync pass still running, skipping trigger");
    }

    fn set_next_run(&self, next_run: Option<DateTime<Utc>>) {
        self.status().next_run = next_run;
    }
}

/// Drives repeated sync passes
///
/// Cloning is cheap; clones share the same state and guard.
#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    config: SchedulerConfig,
    shared: Arc<Shared>,
}

/// Cloneable remote control for a running [`Scheduler`]
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Request shutdown (idempotent)
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Current status
    pub fn status(&self) -> SchedulerStatus {
        self.shared.status().clone()
    }
}

impl Scheduler {
    /// Create an idle scheduler
    pub fn new(engine: Arc<SyncEngine>, config: &SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine,
            config: config.clone(),
            shared: Arc::new(Shared {
                status: Mutex::new(SchedulerStatus::default()),
                shutdown_tx,
                pass_guard: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    /// Handle for stopping the scheduler from another task
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current status
    pub fn status(&self) -> SchedulerStatus {
        self.shared.status().clone()
    }

    /// Request shutdown (idempotent)
    ///
    /// The scheduling loop stops firing immediately; [`start`](Self::start)
    /// returns once the in-flight pass, if any, has finished.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Run the scheduling loop until stopped
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Stopped cleanly, or already stopped before start
    /// - `Err(Error::Setup)`: Bad interval or cron expression, or already running
    pub async fn start(&self) -> Result<()> {
        let schedule = Schedule::from_config(&self.config)?;

        {
            let mut status = self.shared.status();
            match status.state {
                SchedulerState::Stopped => {
                    debug!("Scheduler already stopped, not starting");
                    return Ok(());
                }
                SchedulerState::Running => {
                    return Err(Error::setup("scheduler is already running"));
                }
                SchedulerState::Idle => {
                    status.state = SchedulerState::Running;
                    status.mode = Some(schedule.mode());
                }
            }
        }

        let mut shutdown_rx = self.shared.shutdown_tx.subscribe();
        let mut passes = JoinSet::new();

        info!(
            mode = ?schedule.mode(),
            interval = %self.config.interval,
            cron = self.config.cron_expression().unwrap_or(""),
            run_on_start = self.config.run_on_start,
            "Scheduler started"
        );

        if self.config.run_on_start {
            self.dispatch(&mut passes, "startup");
        }

        match &schedule {
            Schedule::Interval(period) => {
                self.run_interval(*period, &mut shutdown_rx, &mut passes).await;
            }
            Schedule::Cron(cron) => {
                self.run_cron(cron, &mut shutdown_rx, &mut passes).await;
            }
        }

        if !passes.is_empty() {
            info!("Waiting for in-flight sync pass to finish");
        }
        while let Some(joined) = passes.join_next().await {
            self.reaped(joined);
        }

        {
            let mut status = self.shared.status();
            status.state = SchedulerState::Stopped;
            status.next_run = None;
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Run one pass now, unless a pass is already in flight
    ///
    /// Returns `None` when skipped.
    pub async fn run_once(&self) -> Option<SyncTask> {
        if self.shared.status().state == SchedulerState::Stopped {
            warn!("Scheduler is stopped, manual pass not started");
            return None;
        }

        let Ok(_permit) = Arc::clone(&self.shared.pass_guard).try_lock_owned() else {
            self.shared.record_skip("manual");
            return None;
        };

        self.shared.begin_pass();
        let task = self.engine.execute_pass().await;
        self.shared.finish_pass(Some(&task));
        Some(task)
    }

    async fn run_interval(
        &self,
        period: Duration,
        shutdown_rx: &mut watch::Receiver<bool>,
        passes: &mut JoinSet<()>,
    ) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);
        self.shared.set_next_run(next_after(period));

        loop {
            tokio::select! {
                biased;

                _ = cancelled(shutdown_rx) => break,

                Some(_) = ticks.next() => {
                    self.dispatch(passes, "interval");
                    self.shared.set_next_run(next_after(period));
                }
            }
            self.reap(passes);
        }
    }

    async fn run_cron(
        &self,
        cron: &CronSchedule,
        shutdown_rx: &mut watch::Receiver<bool>,
        passes: &mut JoinSet<()>,
    ) {
        let mut last_fire: Option<DateTime<Local>> = None;

        loop {
            let now = Local::now();
            let base = match last_fire {
                Some(fired) if fired > now => fired,
                _ => now,
            };

            let Some(next) = cron.next_after(&base) else {
                warn!(cron = %cron, "Cron expression has no upcoming fire time");
                self.shared.set_next_run(None);
                cancelled(shutdown_rx).await;
                break;
            };
            self.shared.set_next_run(Some(next.with_timezone(&Utc)));
            debug!(next_run = %next, "Next cron fire");

            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                biased;

                _ = cancelled(shutdown_rx) => break,

                _ = tokio::time::sleep(wait) => {
                    last_fire = Some(next);
                    self.dispatch(passes, "cron");
                }
            }
            self.reap(passes);
        }
    }

    /// Spawn a pass unless one is in flight
    fn dispatch(&self, passes: &mut JoinSet<()>, trigger: &'static str) {
        let Ok(permit) = Arc::clone(&self.shared.pass_guard).try_lock_owned() else {
            self.shared.record_skip(trigger);
            return;
        };

        debug!(trigger, "Triggering sync pass");
        self.shared.begin_pass();
        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        passes.spawn(async move {
            let task = engine.execute_pass().await;
            shared.finish_pass(Some(&task));
            drop(permit);
        });
    }

    /// Collect finished pass tasks without waiting
    fn reap(&self, passes: &mut JoinSet<()>) {
        while let Some(joined) = passes.try_join_next() {
            self.reaped(joined);
        }
    }

    fn reaped(&self, joined: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            error!(error = %e, "Sync pass task aborted");
            self.shared.finish_pass(None);
        }
    }
}

/// Resolves once shutdown has been requested
async fn cancelled(shutdown_rx: &mut watch::Receiver<bool>) {
    // a closed channel also means shutdown
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

fn next_after(period: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|period| Utc::now().checked_add_signed(period))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cron: Option<&str>, interval: &str) -> SchedulerConfig {
        SchedulerConfig {
            cron: cron.map(str::to_string),
            interval: interval.to_string(),
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn cron_takes_priority_over_interval() {
        let schedule = Schedule::from_config(&config(Some("0 0 2 * * 0,3"), "1h")).unwrap();
        assert_eq!(schedule.mode(), ScheduleMode::CronDriven);
    }

    #[test]
    fn blank_cron_falls_back_to_interval() {
        let schedule = Schedule::from_config(&config(Some("  "), "90m")).unwrap();
        match schedule {
            Schedule::Interval(period) => assert_eq!(period, Duration::from_secs(5400)),
            other => panic!("expected interval, got {other:?}"),
        }
    }

    #[test]
    fn bad_schedules_are_setup_errors() {
        for (cron, interval) in [(None, "soon"), (None, "0s"), (Some("0 0 2 * *"), "1h")] {
            let err = Schedule::from_config(&config(cron, interval)).unwrap_err();
            assert!(matches!(err, Error::Setup(_)), "got {err:?}");
        }
    }

    #[test]
    fn state_display() {
        assert_eq!(SchedulerState::Running.to_string(), "running");
        assert_eq!(
            serde_json::to_string(&ScheduleMode::IntervalDriven).unwrap(),
            "\"interval_driven\""
        );
    }
}
