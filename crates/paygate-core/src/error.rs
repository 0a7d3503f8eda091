//! Domain error enums, one per subsystem.
//!
//! None of these carry an HTTP status; that mapping lives in each server
//! crate's own `error.rs`.

use paygate_vault::VaultError;

/// Errors from `authenticate()`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing X-Client-ID or X-Client-Secret header")]
    MissingCredentials,

    #[error("credential header failed format validation: {0}")]
    MalformedCredentials(String),

    /// Covers unknown clientId and wrong secret identically, by design:
    /// same error, same latency profile.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Both the vault and the credential cache were unable to answer.
    #[error("vault and credential cache both unavailable")]
    UpstreamUnavailable,

    #[error("system error: {0}")]
    System(String),
}

impl From<VaultError> for AuthError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::CircuitOpen(_) | VaultError::TransientIo(_) => Self::UpstreamUnavailable,
            VaultError::AuthFailure(_) | VaultError::NotFound(_) => Self::AuthenticationFailed,
            VaultError::Conflict(msg) => Self::System(msg),
        }
    }
}

/// Errors from `TokenMinter::mint`.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing key unavailable")]
    SigningKeyUnavailable,
}

/// Reasons a token failed the `Invalid` phase of validation. Carried inside [`ValidationOutcome::Invalid`], not as a
/// `std::error::Error` — validation never throws, it always returns a
/// verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    Malformed,
    SignatureMismatch,
    MissingClaim(&'static str),
    IssuerNotAllowed,
    AudienceMismatch,
    Revoked,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed token"),
            Self::SignatureMismatch => write!(f, "signature did not verify under any key"),
            Self::MissingClaim(claim) => write!(f, "missing required claim: {claim}"),
            Self::IssuerNotAllowed => write!(f, "issuer not in allowed set"),
            Self::AudienceMismatch => write!(f, "audience mismatch"),
            Self::Revoked => write!(f, "token has been revoked"),
        }
    }
}

/// Errors from `RotationCoordinator` operations.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("a non-terminal rotation already exists for this client")]
    RotationInProgress,

    #[error("no rotation found with id {0}")]
    RotationNotFound(String),

    #[error("transition from {from:?} to {to:?} is not permitted")]
    InvalidStateTransition {
        from: crate::rotation::RotationState,
        to: crate::rotation::RotationState,
    },

    #[error("optimistic concurrency conflict on rotation {0} after retry limit")]
    ConcurrencyConflict(String),

    #[error("vault operation failed during rotation: {0}")]
    Vault(#[from] VaultError),

    #[error("rotation store failure: {0}")]
    Store(String),
}
