//! EAPI entry point: the external-facing gateway.
//!
//! Bootstraps the vault client, token minter/keys, rotation store, and all
//! subsystems, then starts the Axum HTTP server with graceful shutdown
//! alongside a background rotation-reconciliation worker.

use std::time::Duration;

use anyhow::Context;
use paygate_eapi::{build_app_state, build_router, rotation_scheduler, shutdown_signal, EapiConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EapiConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(addr = %config.bind_addr, "payment-eapi starting");

    let state = build_app_state(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = {
        let state = state.clone();
        let mut rx = shutdown_rx.clone();
        let interval = config.rotation_scheduler_interval;
        let grace = config.rotation_old_deprecated_grace_seconds;
        tokio::spawn(async move {
            rotation_scheduler(state, &mut rx, interval, grace).await;
        })
    };

    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "payment-eapi listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("waiting for background workers to stop");
    let _ = tokio::time::timeout(Duration::from_secs(10), scheduler_handle).await;

    info!("payment-eapi stopped");
    Ok(())
}
