//! Mycelia Server
//!
//! Serves the builtin capabilities behind bearer-token authentication.

#![warn(missing_docs)]
#![warn(clippy::all)]

use anyhow::{Context, Result};
use clap::Parser;
use mycelia_capability::{Gate, builtin};
use mycelia_server::{AppState, ServerConfig, StaticCredentials, router};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let credentials = match &config.credentials {
        Some(path) => StaticCredentials::load(path)?,
        None => {
            warn!("no credentials file configured, every call will be rejected");
            StaticCredentials::new()
        }
    };

    let registry = builtin::registry()?;
    info!(capabilities = registry.len(), "registry frozen");

    let app = router(AppState::new(Gate::new(Arc::new(registry)), credentials));
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
