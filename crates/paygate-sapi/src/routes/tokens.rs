//! `POST /internal/v1/tokens/validate`: runs
//! `TokenValidator::validate` directly against a caller-supplied token and
//! returns its `ValidationResult`, rather than gating a forwarded request.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use paygate_core::{TokenValidator, ValidationOutcome};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/internal/v1/tokens/validate", post(validate))
}

#[derive(Deserialize)]
struct ValidateRequest {
    token: String,
    #[serde(default)]
    required_permission: String,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
enum ValidateResponse {
    Valid { renewed_token_string: Option<String> },
    Invalid { reason: String },
    Expired,
    Forbidden,
}

impl From<ValidationOutcome> for ValidateResponse {
    fn from(outcome: ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Valid { renewed_token_string } => Self::Valid { renewed_token_string },
            ValidationOutcome::Invalid(reason) => Self::Invalid { reason: reason.to_string() },
            ValidationOutcome::Expired => Self::Expired,
            ValidationOutcome::Forbidden => Self::Forbidden,
        }
    }
}

async fn validate(State(state): State<AppState>, Json(req): Json<ValidateRequest>) -> Json<ValidateResponse> {
    let validator = TokenValidator::new(&state.keys, &state.token_config, &state.revocations);
    let renewal_client: Option<&dyn paygate_core::RenewalClient> =
        state.config.token_renewal_enabled.then_some(state.renewal_client.as_ref() as &dyn paygate_core::RenewalClient);
    let outcome = validator.validate(&req.token, &req.required_permission, chrono::Utc::now(), renewal_client).await;
    Json(outcome.into())
}
