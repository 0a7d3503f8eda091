//! EAPI's side of `RenewalClient`: SAPI POSTs an
//! expired-but-signed token here; EAPI re-verifies the signature, confirms
//! the client is still credentialed, and mints a replacement.
//!
//! This endpoint lives on EAPI, the side that owns signing keys and the
//! credential vault; SAPI's `RenewalClient` implementation calls it over
//! plain HTTP (the choice behind this is recorded in `DESIGN.md`).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/internal/v1/tokens/renew", post(renew))
}

#[derive(Deserialize)]
struct RenewRequest {
    token: String,
}

#[derive(Serialize)]
struct RenewResponse {
    token: String,
}

/// Re-verify the expired token's signature and claims, then remint under
/// the same clientId and permission set — never deriving anything from
/// the raw secret, since EAPI only sees the old token's own claims here.
async fn renew(State(state): State<AppState>, Json(req): Json<RenewRequest>) -> Response {
    let Some((client_id, permissions)) = recover_claims(&state, &req.token) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match state.auth.authenticate_for_renewal(&client_id, permissions).await {
        Ok(token) => Json(RenewResponse { token: token.token_string }).into_response(),
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

/// Verify signature and claims on the expired token without regard to
/// expiry, returning the `(clientId, permissions)` it was minted with.
fn recover_claims(state: &AppState, expired_token_string: &str) -> Option<(String, Vec<String>)> {
    paygate_core::recover_expired_claims(state.keys.as_ref(), expired_token_string)
}
