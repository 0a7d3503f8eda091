//! Token domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried in a minted token's payload segment.
///
/// Field names match the wire format exactly (`sub`, `iss`, `aud`, `exp`,
/// `iat`, `jti`, `permissions`) since this struct is serialized directly
/// into the payload segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub permissions: Vec<String>,
}

/// A minted bearer token: the opaque wire string plus the claims used by
/// in-process callers (cache keys, audit logging, revocation) without
/// re-parsing the string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token_string: String,
    pub jti: String,
    pub client_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<String>,
    pub issuer: String,
    pub audience: String,
}

impl Token {
    /// Whether this token is still within its validity window as of `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Remaining lifetime as of `now`, floored at zero.
    #[must_use]
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> std::time::Duration {
        let secs = (self.expires_at - now).num_seconds().max(0);
        std::time::Duration::from_secs(secs as u64)
    }
}

/// The cache key shape for `TokenCache`: a `clientId` alone, or a
/// `clientId` scoped to a specific permission set.
#[must_use]
pub fn token_cache_key(client_id: &str, permissions: &[String]) -> String {
    if permissions.is_empty() {
        return client_id.to_string();
    }
    let mut sorted = permissions.to_vec();
    sorted.sort_unstable();
    format!("{client_id}:{}", sorted.join(","))
}

/// Outcome of [`crate::token::TokenValidator::validate`].
///
/// A tagged variant, not a `Result` — validation always produces a
/// verdict, never a thrown error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// `renewed_token_string` is set when the original token had expired
    /// and in-band renewal produced a replacement.
    Valid { renewed_token_string: Option<String> },
    Invalid(crate::error::InvalidReason),
    Expired,
    Forbidden,
}
