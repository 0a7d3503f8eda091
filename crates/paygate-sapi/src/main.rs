//! SAPI entry point: the internal-facing service.
//!
//! Validates bearer tokens minted by EAPI and forwards authorized requests
//! to the internal payment backend.

use anyhow::Context;
use paygate_sapi::{build_app_state, build_router, shutdown_signal, SapiConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SapiConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(addr = %config.bind_addr, "payment-sapi starting");

    let state = build_app_state(&config)?;

    let (shutdown_tx, _shutdown_rx) = watch::channel(false);
    let app = build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "payment-sapi listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("payment-sapi stopped");
    Ok(())
}
