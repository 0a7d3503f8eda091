//! `GET /api/v1/health` — liveness, no auth.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/health", get(health))
}

async fn health() -> StatusCode {
    StatusCode::OK
}
