//! `TokenGuard`: verifies the bearer token's signature and claims before a
//! handler runs, injecting the recovered client identity and permission set
//! into request extensions.
//!
//! Permission checks stay in the handler so this layer only settles signature, claims, revocation, and
//! expiry/renewal.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use paygate_core::{recover_expired_claims, TokenValidator, ValidationOutcome};

use crate::error::AppError;
use crate::state::AppState;

/// Recovered token identity, available to handlers via
/// `req.extensions().get::<AuthContext>()`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub client_id: String,
    pub permissions: Vec<String>,
    /// Set when in-band renewal minted a replacement; callers that forward
    /// the token onward should use this instead of the original.
    pub effective_token_string: String,
}

pub async fn token_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token_string) = bearer_token(&req) else {
        return AppError::TokenInvalid("missing Authorization bearer token".to_string()).into_response();
    };
    if req.headers().get("X-Request-ID").is_none() {
        return AppError::InvalidRequest("missing X-Request-ID header".to_string()).into_response();
    }

    let validator = TokenValidator::new(&state.keys, &state.token_config, &state.revocations);
    let renewal_client = state.config.token_renewal_enabled.then_some(state.renewal_client.as_ref());
    let outcome = validator
        .validate(&token_string, "", chrono::Utc::now(), renewal_client.map(|c| c as &dyn paygate_core::RenewalClient))
        .await;

    match outcome {
        ValidationOutcome::Valid { renewed_token_string } => {
            let effective = renewed_token_string.clone().unwrap_or_else(|| token_string.clone());
            let Some((client_id, permissions)) = recover_expired_claims(state.keys.as_ref(), &effective) else {
                return AppError::TokenInvalid("malformed claims".to_string()).into_response();
            };
            req.extensions_mut().insert(AuthContext { client_id, permissions, effective_token_string: effective });
            next.run(req).await
        }
        ValidationOutcome::Invalid(reason) => AppError::TokenInvalid(reason.to_string()).into_response(),
        ValidationOutcome::Expired => AppError::TokenExpired.into_response(),
        ValidationOutcome::Forbidden => unreachable!("token_guard validates with an empty required permission"),
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub fn status_for(outcome: &ValidationOutcome) -> StatusCode {
    match outcome {
        ValidationOutcome::Valid { .. } => StatusCode::OK,
        ValidationOutcome::Invalid(_) | ValidationOutcome::Expired => StatusCode::UNAUTHORIZED,
        ValidationOutcome::Forbidden => StatusCode::FORBIDDEN,
    }
}
