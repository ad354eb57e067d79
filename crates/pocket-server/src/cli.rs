//! Command line flags shared by both binaries

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use pocket_relay::config::{DEFAULT_ENV_PATH, DEFAULT_SETTINGS_PATH};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    /// Settings file (key=value)
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    pub config: PathBuf,

    /// Secrets file, loaded into the environment
    #[arg(long, default_value = DEFAULT_ENV_PATH)]
    pub env_file: PathBuf,

    /// Root directory for rolling log files
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Serve GET /health on this address
    #[arg(long)]
    pub health_addr: Option<SocketAddr>,
}
