//! Router-level tests for the external-facing gateway, using
//! `tower::ServiceExt::oneshot` against the exact router `main.rs` builds.
//!
//! The vault client and rotation store are wired with a throwaway mTLS
//! identity and a lazily-connecting pool respectively (`sqlx`'s
//! `connect_lazy`, which never dials out) — these tests only exercise
//! paths that never touch the vault or the database: health, credential
//! validation ordering, and the admin bearer-token gate.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use paygate_core::{AuthConfig, AuthTranslator, HmacKey, KeyRing, RevocationRegistry, RotationConfig, RotationCoordinator, TokenConfig, TokenMinter};
use paygate_eapi::state::AppState;
use paygate_eapi::{build_router, EapiConfig};
use paygate_store::PostgresRotationStore;
use paygate_vault::{CircuitBreakerConfig, HttpVaultClient, ResilientVaultClient, RetryConfig};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

/// Self-signed test certificate + key (PEM, concatenated) good only for
/// constructing a `reqwest::Identity` in-process; the vault URL it points
/// at is never actually dialed by any of these tests.
const TEST_IDENTITY_PEM: &str = include_str!("fixtures/test-identity.pem");

fn test_config() -> EapiConfig {
    let mut config = EapiConfig::from_env();
    config.vault_url = "https://127.0.0.1:1".to_string();
    config.database_url = "postgres://127.0.0.1/paygate_test_unused".to_string();
    config.admin_token = "test-admin-token".to_string();
    config.signing_key = b"test-signing-key-for-router-tests".to_vec();
    config
}

fn test_state() -> AppState {
    let config = test_config();

    let vault_for_auth: paygate_eapi::state::Vault = ResilientVaultClient::new(
        HttpVaultClient::new(config.vault_url.clone(), TEST_IDENTITY_PEM.as_bytes()).expect("test identity parses"),
        RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            factor: 2,
        },
        CircuitBreakerConfig {
            threshold_pct: 100,
            window_size: 1,
            window_duration: Duration::from_secs(1),
            open_duration: Duration::from_secs(1),
        },
        Duration::from_secs(30),
    );
    let vault_for_rotation: paygate_eapi::state::Vault = ResilientVaultClient::new(
        HttpVaultClient::new(config.vault_url.clone(), TEST_IDENTITY_PEM.as_bytes()).expect("test identity parses"),
        RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            factor: 2,
        },
        CircuitBreakerConfig {
            threshold_pct: 100,
            window_size: 1,
            window_duration: Duration::from_secs(1),
            open_duration: Duration::from_secs(1),
        },
        Duration::from_secs(30),
    );

    // `connect_lazy` builds a pool handle without dialing the database;
    // only exercised by routes we deliberately don't call in these tests.
    let pool = PgPoolOptions::new().connect_lazy(&config.database_url).expect("lazy pool never dials out");
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
    let auth = AuthTranslator::new(vault_for_auth, minter, AuthConfig::default());
    let rotation = RotationCoordinator::new(vault_for_rotation, store, RotationConfig::default());

    AppState {
        auth: Arc::new(auth),
        rotation: Arc::new(rotation),
        revocations: Arc::new(RevocationRegistry::new()),
        keys: Arc::new(keys),
        token_config: Arc::new(token_config),
        http: reqwest::Client::new(),
        config: Arc::new(config),
    }
}

#[tokio::test]
async fn health_check_returns_200_with_no_auth() {
    let app = build_router(test_state());
    let response = app
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn payments_without_credentials_is_rejected_before_any_vault_call() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    // `MissingCredentials` maps to 400; the handler never reaches the vault
    // since the header check runs first.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["errorCode"], "MISSING_CREDENTIALS");
    assert!(json["requestId"].is_string());
}

#[tokio::test]
async fn admin_routes_reject_missing_bearer_token() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/rotations")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"clientId":"vendor_xyz","reason":"scheduled"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_wrong_bearer_token() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/rotations")
                .header("authorization", "Bearer not-the-admin-token")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"clientId":"vendor_xyz","reason":"scheduled"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn renewal_of_a_garbage_token_is_rejected() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/v1/tokens/renew")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"token":"not-a-real-token"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
