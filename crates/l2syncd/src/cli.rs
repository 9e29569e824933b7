//! Command-line arguments

use clap::Parser;
use l2sync_core::config::DEFAULT_CONFIG_PATH;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "l2syncd")]
#[command(version, about = "Sync DCDN L2 edge IPs into Cloud Firewall address books")]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Run one sync pass and exit
    #[arg(long)]
    pub once: bool,

    /// Write a sample config to --config and exit
    #[arg(long)]
    pub gen_config: bool,

    /// Override logging.level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}
