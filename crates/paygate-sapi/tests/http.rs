//! Router-level tests for the internal-facing service, using
//! `tower::ServiceExt::oneshot` against the exact router `main.rs` builds.
//!
//! The payment backend is never actually reachable from these tests (the
//! config points at an address nothing listens on); only paths that never
//! reach `forward()` — the guard itself, and direct token validation — are
//! exercised here.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use paygate_core::{HmacKey, KeyRing, RevocationRegistry, Token, TokenConfig, TokenMinter};
use paygate_sapi::renewal_client::HttpRenewalClient;
use paygate_sapi::state::AppState;
use paygate_sapi::{build_router, SapiConfig};
use tower::ServiceExt;

fn test_config() -> SapiConfig {
    let mut config = SapiConfig::from_env();
    config.signing_key = b"test-signing-key-for-router-tests".to_vec();
    config.eapi_base_url = "http://127.0.0.1:1".to_string();
    config.payment_backend_url = "http://127.0.0.1:1".to_string();
    config
}

fn test_state() -> (AppState, TokenConfig, KeyRing) {
    let config = test_config();
    let keys = KeyRing::single(HmacKey::new(config.signing_key.clone()));
    let token_config = TokenConfig {
        lifetime_seconds: 3600,
        issuer: config.token_issuer.clone(),
        audience: config.token_audience.clone(),
        allowed_issuers: config.token_allowed_issuers.clone(),
        clock_skew_seconds: config.token_clock_skew_seconds,
        renewal_enabled: config.token_renewal_enabled,
    };
    let http = reqwest::Client::new();
    let renewal_client = HttpRenewalClient::new(http.clone(), config.eapi_base_url.clone());

    let state = AppState {
        keys: Arc::new(keys.clone()),
        token_config: Arc::new(token_config.clone()),
        revocations: Arc::new(RevocationRegistry::new()),
        renewal_client: Arc::new(renewal_client),
        backend_http: http,
        config: Arc::new(config),
    };
    (state, token_config, keys)
}

fn mint_token(keys: &KeyRing, token_config: &TokenConfig, permissions: Vec<String>) -> Token {
    let minter = TokenMinter::new(keys.clone(), token_config.clone());
    minter.mint("vendor_xyz", permissions, chrono::Utc::now()).expect("signing key is present")
}

#[tokio::test]
async fn payments_without_bearer_token_is_rejected() {
    let (state, _, _) = test_state();
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/v1/payments")
                .header("x-request-id", "req-1")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn payments_rejects_garbage_bearer_token() {
    let (state, _, _) = test_state();
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/v1/payments")
                .header("authorization", "Bearer not-a-real-token")
                .header("x-request-id", "req-2")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn payments_missing_request_id_header_is_rejected() {
    let (state, token_config, keys) = test_state();
    let token = mint_token(&keys, &token_config, vec!["process_payment".to_string()]);
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/v1/payments")
                .header("authorization", format!("Bearer {}", token.token_string))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payments_with_valid_token_but_wrong_permission_is_forbidden() {
    let (state, token_config, keys) = test_state();
    // Minted with only `view_status`, but `create_payment` requires `process_payment`.
    let token = mint_token(&keys, &token_config, vec!["view_status".to_string()]);
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/v1/payments")
                .header("authorization", format!("Bearer {}", token.token_string))
                .header("x-request-id", "req-3")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn token_validate_endpoint_reports_invalid_for_garbage_token() {
    let (state, _, _) = test_state();
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/v1/tokens/validate")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"token":"garbage"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["outcome"], "INVALID");
}

#[tokio::test]
async fn token_validate_endpoint_reports_valid_for_a_freshly_minted_token() {
    let (state, token_config, keys) = test_state();
    let token = mint_token(&keys, &token_config, vec!["process_payment".to_string()]);
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/v1/tokens/validate")
                .header("content-type", "application/json")
                .body(Body::from(format!(
                    r#"{{"token":"{}","required_permission":"process_payment"}}"#,
                    token.token_string
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["outcome"], "VALID");
}
