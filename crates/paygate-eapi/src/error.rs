//! HTTP error mapping for the EAPI surface.
//!
//! Every response body conforms to a fixed wire shape:
//! `{ errorCode, message, requestId, timestamp }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use paygate_core::{AuthError, RotationError};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug)]
pub enum AppError {
    MissingCredentials,
    MalformedCredentials(String),
    AuthenticationFailed,
    UpstreamUnavailable,
    RotationInProgress,
    RotationNotFound(String),
    InvalidStateTransition(String),
    InvalidRequest(String),
    Unauthorized(String),
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
            Self::MissingCredentials => (StatusCode::BAD_REQUEST, "MISSING_CREDENTIALS", "missing credential headers".to_string()),
            Self::MalformedCredentials(msg) => (StatusCode::BAD_REQUEST, "MALFORMED_CREDENTIALS", msg),
            Self::AuthenticationFailed => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED", "authentication failed".to_string()),
            Self::UpstreamUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE", "vault and credential cache both unavailable".to_string()),
            Self::RotationInProgress => (StatusCode::CONFLICT, "ROTATION_IN_PROGRESS", "a non-terminal rotation already exists for this client".to_string()),
            Self::RotationNotFound(msg) => (StatusCode::NOT_FOUND, "ROTATION_NOT_FOUND", msg),
            Self::InvalidStateTransition(msg) => (StatusCode::BAD_REQUEST, "INVALID_STATE_TRANSITION", msg),
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED", msg),
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

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => Self::MissingCredentials,
            AuthError::MalformedCredentials(msg) => Self::MalformedCredentials(msg),
            AuthError::AuthenticationFailed => Self::AuthenticationFailed,
            AuthError::UpstreamUnavailable => Self::UpstreamUnavailable,
            AuthError::System(msg) => Self::System(msg),
        }
    }
}

impl From<RotationError> for AppError {
    fn from(err: RotationError) -> Self {
        match err {
            RotationError::RotationInProgress => Self::RotationInProgress,
            RotationError::RotationNotFound(id) => Self::RotationNotFound(format!("no rotation found with id {id}")),
            RotationError::InvalidStateTransition { from, to } => {
                Self::InvalidStateTransition(format!("transition from {from} to {to} is not permitted"))
            }
            RotationError::ConcurrencyConflict(id) => Self::System(format!("concurrency conflict on rotation {id}")),
            RotationError::Vault(vault_err) => Self::UpstreamUnavailable.with_vault_log(&vault_err),
            RotationError::Store(msg) => Self::System(msg),
        }
    }
}

impl AppError {
    fn with_vault_log(self, vault_err: &paygate_vault::VaultError) -> Self {
        tracing::warn!(error = %vault_err, "vault operation failed during rotation");
        self
    }
}
