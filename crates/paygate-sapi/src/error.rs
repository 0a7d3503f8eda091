//! HTTP error mapping for the SAPI surface, mirroring
//! `paygate_eapi::error::AppError`'s wire shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug)]
pub enum AppError {
    TokenInvalid(String),
    TokenExpired,
    PermissionDenied,
    InvalidRequest(String),
    System(String),
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "errorCode")]
    error_code: &'static str,
    message: String,
    #[serde(rename = "requestId")]
    request_id: String,
    timestamp: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Self::TokenInvalid(msg) => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", msg),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "token has expired".to_string()),
            Self::PermissionDenied => (StatusCode::FORBIDDEN, "PERMISSION_DENIED", "token lacks required permission".to_string()),
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            Self::System(msg) => {
                tracing::error!(error = %msg, "system error");
                (StatusCode::INTERNAL_SERVER_ERROR, "SYSTEM_ERROR", "internal server error".to_string())
            }
        };

        let body = ErrorBody {
            error_code,
            message,
            request_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, axum::Json(body)).into_response()
    }
}
