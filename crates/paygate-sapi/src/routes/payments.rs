//! `POST /internal/v1/payments` and `GET /internal/v1/payments/{id}`.
//! Behind `TokenGuard`; forwards the opaque request body to the internal
//! payment backend, whose own processing logic is out of scope here.

use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/internal/v1/payments", post(create_payment))
        .route("/internal/v1/payments/{id}", get(get_payment))
}

async fn create_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, AppError> {
    require_permission(&ctx, "process_payment")?;
    forward(&state, "POST", "/payments", Some(body)).await
}

async fn get_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    require_permission(&ctx, "view_status")?;
    forward(&state, "GET", &format!("/payments/{id}"), None).await
}

fn require_permission(ctx: &AuthContext, permission: &str) -> Result<(), AppError> {
    if ctx.permissions.iter().any(|p| p == permission) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

async fn forward(state: &AppState, method: &str, path: &str, body: Option<Bytes>) -> Result<Response, AppError> {
    let url = format!("{}{}", state.config.payment_backend_url, path);
    let mut req = match method {
        "POST" => state.backend_http.post(url),
        _ => state.backend_http.get(url),
    };
    if let Some(body) = body {
        req = req.body(body);
    }
    let resp = req.send().await.map_err(|e| AppError::System(format!("payment backend request failed: {e}")))?;
    let status = axum::http::StatusCode::from_u16(resp.status().as_u16()).unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
    let body = resp.bytes().await.map_err(|e| AppError::System(format!("payment backend response read failed: {e}")))?;
    Ok((status, body).into_response())
}
