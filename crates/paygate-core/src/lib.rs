//! Domain logic for the payment authentication gateway: token
//! minting/validation, credential-rotation orchestration, and the
//! `AuthTranslator` that ties vault lookups to minted tokens.
//!
//! Storage- and transport-agnostic: `paygate-store` supplies
//! [`rotation::RotationStore`], `paygate-eapi`/`paygate-sapi` supply HTTP
//! surfaces and wire this crate's types into `axum` handlers.

pub mod audit;
pub mod auth;
pub mod cache;
pub mod error;
pub mod keys;
pub mod model;
pub mod renewal;
pub mod revocation;
pub mod rotation;
pub mod singleflight;
pub mod token;

pub use audit::{mask_client_id, AuthAuditEvent, AuthOutcome};
pub use auth::{AuthConfig, AuthSuccess, AuthTranslator};
pub use cache::TokenCache;
pub use error::{AuthError, InvalidReason, RotationError, TokenError};
pub use keys::{HmacKey, KeyRing};
pub use model::{token_cache_key, Claims, Token, ValidationOutcome};
pub use renewal::RenewalClient;
pub use revocation::RevocationRegistry;
pub use rotation::{hash_secret, RotationConfig, RotationCoordinator, RotationRecord, RotationState, RotationStore};
pub use singleflight::SingleFlight;
pub use token::{recover_expired_claims, TokenConfig, TokenMinter, TokenValidator};
