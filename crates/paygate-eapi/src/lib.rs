//! The external-facing gateway: vendor payment proxy, health check, admin
//! rotation surface, and the renewal callback endpoint.
//!
//! Wires the domain library and vault/store crates into Axum routes and
//! exposes `build_app_state`/`build_router` so both the binary and
//! integration tests construct the exact same server.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use axum::Router;
use paygate_core::{
    AuthConfig, AuthTranslator, HmacKey, KeyRing, RevocationRegistry, RotationConfig, RotationCoordinator, TokenConfig,
    TokenMinter,
};
use paygate_store::PostgresRotationStore;
use paygate_vault::{CircuitBreakerConfig, HttpVaultClient, ResilientVaultClient, RetryConfig};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::EapiConfig;
pub use state::{AppState, Vault};

pub async fn build_app_state(config: &EapiConfig) -> anyhow::Result<AppState> {
    let identity_pem = std::fs::read(&config.vault_cert_path)
        .and_then(|mut cert| {
            let key = std::fs::read(&config.vault_key_path)?;
            cert.extend_from_slice(&key);
            Ok(cert)
        })
        .unwrap_or_default();

    let http_vault = HttpVaultClient::new(config.vault_url.clone(), &identity_pem)
        .context("failed to build vault client")?;
    let vault: Vault = ResilientVaultClient::new(
        http_vault,
        RetryConfig {
            max_attempts: config.vault_retry.max_attempts,
            base_delay: Duration::from_millis(config.vault_retry.base_ms),
            max_delay: Duration::from_secs(5),
            factor: config.vault_retry.factor,
        },
        CircuitBreakerConfig {
            threshold_pct: config.vault_circuit_breaker.threshold_pct,
            window_size: config.vault_circuit_breaker.window_size,
            window_duration: Duration::from_secs(config.vault_circuit_breaker.window_duration_seconds),
            open_duration: Duration::from_secs(config.vault_circuit_breaker.open_duration_seconds),
        },
        config.cache_credential_ttl,
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to rotation database")?;
    let store = PostgresRotationStore::new(pool);

    let keys = KeyRing::single(HmacKey::new(config.signing_key.clone()));

    let token_config = TokenConfig {
        lifetime_seconds: config.token_lifetime_seconds,
        issuer: config.token_issuer.clone(),
        audience: config.token_audience.clone(),
        allowed_issuers: config.token_allowed_issuers.clone(),
        clock_skew_seconds: config.token_clock_skew_seconds,
        renewal_enabled: config.token_renewal_enabled,
    };
    let minter = TokenMinter::new(keys.clone(), token_config.clone());

    let auth_config = AuthConfig {
        renewal_threshold_seconds: config.token_renewal_threshold_seconds,
        credential_cache_ttl: config.cache_credential_ttl,
        ..AuthConfig::default()
    };

    // `AuthTranslator` and `RotationCoordinator` each need their own vault
    // handle; the vault client only borrows the HTTP connection pool inside
    // it, so building one per consumer is cheap and keeps circuit-breaker
    // state scoped to how each consumer actually calls the vault.
    let auth_vault: Vault = ResilientVaultClient::new(
        HttpVaultClient::new(config.vault_url.clone(), &identity_pem).context("failed to build vault client")?,
        RetryConfig {
            max_attempts: config.vault_retry.max_attempts,
            base_delay: Duration::from_millis(config.vault_retry.base_ms),
            max_delay: Duration::from_secs(5),
            factor: config.vault_retry.factor,
        },
        CircuitBreakerConfig {
            threshold_pct: config.vault_circuit_breaker.threshold_pct,
            window_size: config.vault_circuit_breaker.window_size,
            window_duration: Duration::from_secs(config.vault_circuit_breaker.window_duration_seconds),
            open_duration: Duration::from_secs(config.vault_circuit_breaker.open_duration_seconds),
        },
        config.cache_credential_ttl,
    );

    let auth = AuthTranslator::new(auth_vault, minter, auth_config);
    let rotation_config = RotationConfig {
        default_transition_period_seconds: config.rotation_default_transition_period_seconds,
    };
    let rotation = RotationCoordinator::new(vault, store, rotation_config);

    Ok(AppState {
        auth: Arc::new(auth),
        rotation: Arc::new(rotation),
        revocations: Arc::new(RevocationRegistry::new()),
        keys: Arc::new(keys),
        token_config: Arc::new(token_config),
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build sapi http client")?,
        config: Arc::new(config.clone()),
    })
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = routes::rotations::router()
        .route_layer(axum_mw::from_fn_with_state(state.clone(), middleware::admin_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::PUT, axum::http::Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static("x-client-id"),
            axum::http::HeaderName::from_static("x-client-secret"),
            axum::http::HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::payments::router())
        .merge(routes::renewal::router())
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(tower::limit::ConcurrencyLimitLayer::new(512))
        .with_state(state)
}

/// Periodically drives `check_progress` across all non-terminal rotations.
pub async fn rotation_scheduler(state: AppState, shutdown: &mut watch::Receiver<bool>, interval: Duration, grace_seconds: i64) {
    let mut ticker = tokio::time::interval(interval);
    info!(interval_ms = %interval.as_millis(), "rotation scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match state.rotation.check_progress(chrono::Utc::now(), grace_seconds, state.auth.token_cache()).await {
                    Ok(advanced) if advanced.is_empty() => {}
                    Ok(advanced) => info!(count = advanced.len(), "rotation scheduler advanced records"),
                    Err(err) => tracing::warn!(error = %err, "rotation scheduler tick failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("rotation scheduler shutting down");
                    return;
                }
            }
        }
    }
}

pub async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
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
