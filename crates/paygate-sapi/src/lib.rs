//! The internal-facing service: `TokenGuard` middleware, token validation,
//! and opaque forwarding to the payment backend.
//!
//! Exposes `build_app_state`/`build_router` so both the binary and
//! integration tests construct the exact same server.

pub mod config;
pub mod error;
pub mod middleware;
pub mod renewal_client;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use axum::Router;
use paygate_core::{HmacKey, KeyRing, RevocationRegistry, TokenConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::SapiConfig;
pub use renewal_client::HttpRenewalClient;
pub use state::AppState;

pub fn build_app_state(config: &SapiConfig) -> anyhow::Result<AppState> {
    let keys = KeyRing::single(HmacKey::new(config.signing_key.clone()));
    let token_config = TokenConfig {
        lifetime_seconds: 3600,
        issuer: config.token_issuer.clone(),
        audience: config.token_audience.clone(),
        allowed_issuers: config.token_allowed_issuers.clone(),
        clock_skew_seconds: config.token_clock_skew_seconds,
        renewal_enabled: config.token_renewal_enabled,
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build outbound http client")?;

    let renewal_client = HttpRenewalClient::new(http.clone(), config.eapi_base_url.clone());

    Ok(AppState {
        keys: Arc::new(keys),
        token_config: Arc::new(token_config),
        revocations: Arc::new(RevocationRegistry::new()),
        renewal_client: Arc::new(renewal_client),
        backend_http: http,
        config: Arc::new(config.clone()),
    })
}

pub fn build_router(state: AppState) -> Router {
    let guarded = routes::payments::router()
        .route_layer(axum_mw::from_fn_with_state(state.clone(), middleware::token_guard));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION, axum::http::HeaderName::from_static("x-request-id")]);

    Router::new()
        .merge(guarded)
        .merge(routes::tokens::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(tower::limit::ConcurrencyLimitLayer::new(512))
        .with_state(state)
}

pub async fn shutdown_signal(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
