//! pingwatch -- scheduled HTTP uptime and latency probe.
//!
//! Every cycle POSTs a synthetic payload to one endpoint, times the reply,
//! appends the result to SQLite, and pushes it to live WebSocket observers.

pub mod analysis;
pub mod api;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod probes;
pub mod scheduler;
pub mod storage;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::broadcast::ObserverRegistry;
use crate::config::MonitorConfig;
use crate::probes::http::HttpProbe;
use crate::probes::PayloadGenerator;
use crate::scheduler::Monitor;
use crate::storage::{Pool, SqliteStore};

/// Wire the production pipeline: HTTP probe, SQLite store, empty registry.
pub fn build_monitor(config: &MonitorConfig, pool: Pool) -> Result<Monitor> {
    let probe = HttpProbe::new(config.probe.target_url.clone(), config.probe.timeout())?;
    Ok(Monitor::new(
        PayloadGenerator::default(),
        Arc::new(probe),
        Arc::new(SqliteStore::new(pool)),
        ObserverRegistry::new(),
    ))
}

/// Start the daemon: API server, observer socket, and periodic scheduler.
pub async fn serve(config: MonitorConfig) -> Result<()> {
    config.validate()?;

    // 1. Initialize Storage
    let db_path = config.storage.db_path.as_str();
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(db_path)?;

    // 2. Initialize the probe pipeline
    let monitor = build_monitor(&config, pool)?;
    tracing::info!(
        target_url = %config.probe.target_url,
        timeout_secs = config.probe.timeout_secs,
        "Probe configured"
    );

    // 3. Start Scheduler Engine (background task)
    let scheduler = monitor.start(config.schedule.interval());

    // 4. Start API Server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(api::state::AppState::new(monitor), &config.server.cors_origins);

    tracing::info!(%addr, "pingwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Let an in-flight probe finish before exiting
    scheduler.shutdown().await;
    tracing::info!("pingwatch stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
