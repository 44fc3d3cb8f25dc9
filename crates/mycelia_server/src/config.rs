//! Command line and environment configuration.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Parser)]
#[command(name = "mycelia-server")]
#[command(about = "Policy-gated capability server", long_about = None, version)]
pub struct ServerConfig {
    /// Bind address
    #[arg(short, long, env = "MYCELIA_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Credentials file mapping token hashes to principals
    #[arg(short, long, env = "MYCELIA_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "MYCELIA_LOG", default_value = "info,tower_http=debug")]
    pub log_filter: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "MYCELIA_LOG_JSON")]
    pub json_logs: bool,
}
