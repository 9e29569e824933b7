// # l2syncd - DCDN L2 edge IP synchronizer daemon
//
// This daemon is a THIN integration layer:
// - Parse the command line
// - Load the YAML configuration (or write a sample)
// - Install logging
// - Build the DCDN source and the Cloud Firewall syncer
// - Run one pass (`--once`) or the scheduler until SIGTERM/SIGINT
//
// All sync logic lives in l2sync-core. Nothing here retries or filters.
//
// ## Usage
//
// ```bash
// l2syncd --gen-config --config configs/config.yaml
// export DCDN_ALIBABA_CLOUD_ACCESS_KEY_ID=...
// export DCDN_ALIBABA_CLOUD_ACCESS_KEY_SECRET=...
// export FIREWALL_ALIBABA_CLOUD_ACCESS_KEY_ID=...
// export FIREWALL_ALIBABA_CLOUD_ACCESS_KEY_SECRET=...
// l2syncd --config configs/config.yaml --once
// ```

mod cli;
mod logging;
mod sample;

use clap::Parser;
use cli::Cli;
use l2sync_core::config::{Config, validate_log_level};
use l2sync_core::{Error, Scheduler, SyncEngine, SyncTask, TaskStatus};
use l2sync_ip_dcdn::DcdnSourceIpProvider;
use l2sync_provider_cloudfw::cloud_firewall_syncer;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown, or a `--once` pass that synced every group
/// - 1: Configuration, setup or credential error
/// - 2: Runtime error, or a `--once` pass that did not fully succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Exit code for an error that ended the process
fn exit_code_for_error(err: &Error) -> SyncExitCode {
    if err.is_startup() {
        SyncExitCode::ConfigError
    } else {
        SyncExitCode::RuntimeError
    }
}

/// Exit code for the pass run by `--once` (`None` when it was skipped)
fn exit_code_for_task(task: Option<&SyncTask>) -> SyncExitCode {
    match task.map(|t| t.status) {
        Some(TaskStatus::Completed) => SyncExitCode::CleanShutdown,
        _ => SyncExitCode::RuntimeError,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.gen_config {
        return match sample::write_sample(&cli.config) {
            Ok(()) => {
                println!("Sample configuration written to {}", cli.config.display());
                SyncExitCode::CleanShutdown.into()
            }
            Err(e) => {
                eprintln!(
                    "Failed to write sample configuration to {}: {}",
                    cli.config.display(),
                    e
                );
                SyncExitCode::ConfigError.into()
            }
        };
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(Error::ConfigNotFound(path)) => {
            eprintln!("Configuration file not found: {}", path.display());
            match sample::write_sample(&path) {
                Ok(()) => eprintln!(
                    "A sample configuration was written there. Edit it and run l2syncd again."
                ),
                Err(e) => eprintln!("Failed to write sample configuration: {}", e),
            }
            return SyncExitCode::ConfigError.into();
        }
        Err(e) => {
            eprintln!("{}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Some(level) = cli.log_level.as_deref()
        && let Err(e) = validate_log_level(level)
    {
        eprintln!("--log-level: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    let _log_guard = match logging::init(&config.logging, cli.log_level.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        groups = config.sync.address_groups.len(),
        "Starting l2syncd"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match run(config, cli.once).await {
            Ok(code) => code,
            Err(e) => {
                error!(error = %e, "l2syncd failed");
                exit_code_for_error(&e)
            }
        }
    });

    info!(exit_code = code as u8, "l2syncd exiting");
    code.into()
}

/// Wire the components together and run
async fn run(config: Config, once: bool) -> Result<SyncExitCode, Error> {
    let source = Arc::new(DcdnSourceIpProvider::from_config(&config.dcdn)?);
    let syncer = Arc::new(cloud_firewall_syncer(&config)?);
    let engine = Arc::new(SyncEngine::new(source, syncer, &config)?);
    let scheduler = Scheduler::new(engine, &config.scheduler);

    if once {
        info!("Running a single sync pass");
        let task = scheduler.run_once().await;
        if let Some(task) = &task {
            match serde_json::to_string_pretty(task) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "Failed to render task record"),
            }
        }
        return Ok(exit_code_for_task(task.as_ref()));
    }

    let mut shutdown = ShutdownSignals::install()?;
    let handle = scheduler.handle();
    let waiter = tokio::spawn(async move {
        let signal = shutdown.recv().await;
        info!(signal, "Received shutdown signal");
        handle.stop();
    });

    let result = scheduler.start().await;
    waiter.abort();
    result?;

    if let Some(last) = scheduler.status().last_task {
        info!(
            task_id = %last.task_id,
            status = %last.status,
            "Last sync pass"
        );
    }
    Ok(SyncExitCode::CleanShutdown)
}

/// SIGTERM/SIGINT listeners, installed before the scheduler starts
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self, Error> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| Error::setup(format!("failed to set up SIGTERM handler: {e}")))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| Error::setup(format!("failed to set up SIGINT handler: {e}")))?;
        Ok(Self { sigterm, sigint })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// CTRL-C listener for non-Unix platforms
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self, Error> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}
