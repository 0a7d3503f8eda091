//! Admin rotation surface. Every route here sits behind
//! the admin bearer-token middleware installed in `main.rs`, distinct from
//! the vendor-facing credential path.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use paygate_core::{RotationRecord, RotationState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/rotations/initiate", post(initiate))
        .route("/api/v1/rotations/active", get(list_active))
        .route("/api/v1/rotations/client/{client_id}", get(list_for_client))
        .route("/api/v1/rotations/{id}", get(get_rotation))
        .route("/api/v1/rotations/{id}", delete(cancel))
        .route("/api/v1/rotations/{id}/advance", put(advance))
        .route("/api/v1/rotations/{id}/complete", put(complete))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateRequest {
    client_id: String,
    reason: Option<String>,
    transition_period_minutes: Option<i64>,
    #[serde(default)]
    force_rotation: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateResponse {
    #[serde(flatten)]
    record: RotationRecord,
    /// The one-time raw secret, surfaced only on this response.
    raw_secret: String,
}

async fn initiate(
    State(state): State<AppState>,
    Json(req): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>, AppError> {
    if req.client_id.is_empty() {
        return Err(AppError::InvalidRequest("clientId is required".to_string()));
    }
    let transition_period_seconds = req.transition_period_minutes.map(|m| m * 60);
    let (record, raw_secret) = state
        .rotation
        .initiate(&req.client_id, req.reason, transition_period_seconds, req.force_rotation)
        .await?;
    Ok(Json(InitiateResponse { record, raw_secret }))
}

async fn get_rotation(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<RotationRecord>, AppError> {
    let record = state.rotation.get(id).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvanceRequest {
    target_state: RotationState,
}

async fn advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdvanceRequest>,
) -> Result<Json<RotationRecord>, AppError> {
    let record = state.rotation.advance(id, req.target_state, state.auth.token_cache()).await?;
    Ok(Json(record))
}

async fn complete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<RotationRecord>, AppError> {
    let record = state.rotation.complete(id, state.auth.token_cache()).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct CancelRequest {
    reason: String,
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<RotationRecord>, AppError> {
    let record = state.rotation.cancel(id, req.reason).await?;
    Ok(Json(record))
}

async fn list_for_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<RotationRecord>>, AppError> {
    let records = state.rotation.list_for_client(&client_id).await?;
    Ok(Json(records))
}

async fn list_active(State(state): State<AppState>) -> Result<Json<Vec<RotationRecord>>, AppError> {
    let records = state.rotation.list_active().await?;
    Ok(Json(records))
}
