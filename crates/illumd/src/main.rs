//! illumd: Illuminate calculation daemon.

use std::sync::Arc;

use anyhow::{Context, Result};

use illum_api::ApiState;
use illum_core::config::IllumConfig;
use illum_services::ReferenceEngine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = IllumConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = IllumConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        IllumConfig::default()
    });
    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        max_sessions = config.sessions.max_sessions,
        max_budget_units = config.budget.max_budget_units,
        "illumd starting"
    );

    let engine = Arc::new(ReferenceEngine::new(config.budget.default_reflectance_passes));
    let state = ApiState::from_config(&config, engine).context("failed to start worker pool")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    {
        let shutdown = state.shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    let sessions = state.sessions.clone();
    sessions.start_sweeper();

    // ── Serve until shutdown ─────────────────────────────────────────────────
    let served = illum_api::serve(state, &config.server.bind, config.server.port).await;

    tracing::info!("shutting down");
    sessions.stop_sweeper().await;
    served
}
