//! `POST /api/v1/payments` and `GET /api/v1/payments/{id}`.
//!
//! `authenticate()` then `forward()` — the two steps of the vendor-facing
//! path. The forwarded body is treated as opaque bytes end to end, never
//! deserialized by the gateway.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/payments", post(create_payment))
        .route("/api/v1/payments/{id}", get(get_payment))
}

fn client_credentials(headers: &HeaderMap) -> Result<(&str, &str), AppError> {
    let client_id = headers
        .get("X-Client-ID")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingCredentials)?;
    let client_secret = headers
        .get("X-Client-Secret")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingCredentials)?;
    Ok((client_id, client_secret))
}

fn request_id_header(headers: &HeaderMap) -> String {
    headers
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let (client_id, client_secret) = client_credentials(&headers)?;
    let request_id = request_id_header(&headers);

    let success = state
        .auth
        .authenticate(client_id, client_secret, None, Some(request_id.clone()))
        .await?;

    forward(
        &state,
        client_id,
        client_secret,
        "POST",
        "/internal/v1/payments",
        &request_id,
        success.token.token_string,
        Some(body),
    )
    .await
}

async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let (client_id, client_secret) = client_credentials(&headers)?;
    let request_id = request_id_header(&headers);

    let success = state
        .auth
        .authenticate(client_id, client_secret, None, Some(request_id.clone()))
        .await?;

    let path = format!("/internal/v1/payments/{id}");
    forward(&state, client_id, client_secret, "GET", &path, &request_id, success.token.token_string, None).await
}

/// Forwards a request to SAPI with the minted token attached. On a SAPI
/// `401 TOKEN_EXPIRED`, evict the cached token, remint once against the
/// vendor's credentials
/// (already verified by the `authenticate()` call above this turn), and
/// retry; any further failure propagates to the vendor.
async fn forward(
    state: &AppState,
    client_id: &str,
    client_secret: &str,
    method: &str,
    path: &str,
    request_id: &str,
    bearer_token: String,
    body: Option<Bytes>,
) -> Result<Response, AppError> {
    let resp = send(state, method, path, request_id, &bearer_token, body.clone()).await?;

    if resp.status() == StatusCode::UNAUTHORIZED && is_token_expired(&resp.body) {
        state.auth.token_cache().evict_by_prefix(client_id);
        let remint = state.auth.authenticate(client_id, client_secret, None, Some(request_id.to_string())).await?;
        let retried = send(state, method, path, request_id, &remint.token.token_string, body).await?;
        return Ok(retried.into_response());
    }

    Ok(resp.into_response())
}

struct ForwardedResponse {
    status: StatusCode,
    body: Bytes,
    content_type: Option<String>,
}

impl IntoResponse for ForwardedResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        if let Some(ct) = self.content_type {
            if let Ok(value) = axum::http::HeaderValue::from_str(&ct) {
                response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
            }
        }
        response
    }
}

fn is_token_expired(body: &Bytes) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("errorCode").and_then(|c| c.as_str()).map(str::to_string))
        .is_some_and(|code| code == "TOKEN_EXPIRED")
}

async fn send(
    state: &AppState,
    method: &str,
    path: &str,
    request_id: &str,
    bearer_token: &str,
    body: Option<Bytes>,
) -> Result<ForwardedResponse, AppError> {
    let url = format!("{}{}", state.config.sapi_base_url, path);
    let mut req = match method {
        "POST" => state.http.post(url),
        _ => state.http.get(url),
    }
    .header("Authorization", format!("Bearer {bearer_token}"))
    .header("X-Request-ID", request_id);

    if let Some(body) = body {
        req = req.body(body);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| AppError::System(format!("sapi request failed: {e}")))?;

    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp
        .bytes()
        .await
        .map_err(|e| AppError::System(format!("sapi response read failed: {e}")))?;

    Ok(ForwardedResponse { status, body, content_type })
}
