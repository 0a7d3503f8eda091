//! `TokenMinter` and `TokenValidator`.
//!
//! The wire format is three base64url segments joined by `.`, so this is
//! hand-rolled over `hmac`/`sha2`/`base64` rather than built on the
//! `jsonwebtoken` crate.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{InvalidReason, TokenError};
use crate::keys::KeyRing;
use crate::model::{Claims, Token, ValidationOutcome};
use crate::renewal::RenewalClient;
use crate::revocation::RevocationRegistry;

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Configuration for minted tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub lifetime_seconds: i64,
    pub issuer: String,
    pub audience: String,
    pub allowed_issuers: Vec<String>,
    pub clock_skew_seconds: i64,
    pub renewal_enabled: bool,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifetime_seconds: 3600,
            issuer: "payment-eapi".to_string(),
            audience: "payment-sapi".to_string(),
            allowed_issuers: vec!["payment-eapi".to_string()],
            clock_skew_seconds: 30,
            renewal_enabled: true,
        }
    }
}

/// Mints signed bearer tokens from the current signing key.
pub struct TokenMinter {
    keys: KeyRing,
    config: TokenConfig,
}

impl TokenMinter {
    #[must_use]
    pub fn new(keys: KeyRing, config: TokenConfig) -> Self {
        Self { keys, config }
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Mint a token for `client_id` carrying exactly `permissions`
    /// (never derived from the raw secret).
    pub fn mint(&self, client_id: &str, permissions: Vec<String>, now: DateTime<Utc>) -> Result<Token, TokenError> {
        let jti = Uuid::new_v4().to_string();
        let iat = now.timestamp();
        let exp = iat + self.config.lifetime_seconds;

        let claims = Claims {
            sub: client_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp,
            iat,
            jti: jti.clone(),
            permissions: permissions.clone(),
        };

        let token_string = self.encode(&claims)?;

        Ok(Token {
            token_string,
            jti,
            client_id: client_id.to_string(),
            issued_at: now,
            expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(now),
            permissions,
            issuer: claims.iss,
            audience: claims.aud,
        })
    }

    fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        let header_b64 = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let payload_json = serde_json::to_vec(claims).map_err(|_| TokenError::SigningKeyUnavailable)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = self.keys.sign(signing_input.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature);
        Ok(format!("{signing_input}.{signature_b64}"))
    }
}

/// Parses and verifies bearer tokens.
pub struct TokenValidator<'a> {
    keys: &'a KeyRing,
    config: &'a TokenConfig,
    revocations: &'a RevocationRegistry,
}

struct ParsedClaims {
    iss: Option<String>,
    aud: Option<String>,
    sub: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    jti: Option<String>,
    permissions: Vec<String>,
}

impl<'a> TokenValidator<'a> {
    #[must_use]
    pub fn new(keys: &'a KeyRing, config: &'a TokenConfig, revocations: &'a RevocationRegistry) -> Self {
        Self { keys, config, revocations }
    }

    fn split_and_decode(token_string: &str) -> Option<(String, Vec<u8>, Vec<u8>)> {
        let mut parts = token_string.split('.');
        let header_b64 = parts.next()?;
        let payload_b64 = parts.next()?;
        let signature_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let signing_input = format!("{header_b64}.{payload_b64}");
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        Some((signing_input, payload, signature))
    }

    fn parse_claims(payload: &[u8]) -> Option<ParsedClaims> {
        let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
        let obj = value.as_object()?;
        Some(ParsedClaims {
            iss: obj.get("iss").and_then(|v| v.as_str()).map(str::to_string),
            aud: obj.get("aud").and_then(|v| v.as_str()).map(str::to_string),
            sub: obj.get("sub").and_then(|v| v.as_str()).map(str::to_string),
            exp: obj.get("exp").and_then(serde_json::Value::as_i64),
            iat: obj.get("iat").and_then(serde_json::Value::as_i64),
            jti: obj.get("jti").and_then(|v| v.as_str()).map(str::to_string),
            permissions: obj
                .get("permissions")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|p| p.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Runs the full validation pipeline, with optional in-band renewal
    /// once the signature has been confirmed on an expired token.
    pub async fn validate(
        &self,
        token_string: &str,
        required_permission: &str,
        now: DateTime<Utc>,
        renewal_client: Option<&dyn RenewalClient>,
    ) -> ValidationOutcome {
        // Phase 1: parse.
        let Some((signing_input, payload, signature)) = Self::split_and_decode(token_string) else {
            return ValidationOutcome::Invalid(InvalidReason::Malformed);
        };

        // Phase 2: signature.
        if !self.keys.verify_any(signing_input.as_bytes(), &signature) {
            return ValidationOutcome::Invalid(InvalidReason::SignatureMismatch);
        }

        // Phase 3: claims.
        let Some(claims) = Self::parse_claims(&payload) else {
            return ValidationOutcome::Invalid(InvalidReason::Malformed);
        };
        let Some(iss) = claims.iss.as_deref() else {
            return ValidationOutcome::Invalid(InvalidReason::MissingClaim("iss"));
        };
        let Some(aud) = claims.aud.as_deref() else {
            return ValidationOutcome::Invalid(InvalidReason::MissingClaim("aud"));
        };
        if claims.sub.is_none() {
            return ValidationOutcome::Invalid(InvalidReason::MissingClaim("sub"));
        }
        let Some(exp) = claims.exp else {
            return ValidationOutcome::Invalid(InvalidReason::MissingClaim("exp"));
        };
        if claims.iat.is_none() {
            return ValidationOutcome::Invalid(InvalidReason::MissingClaim("iat"));
        }
        let Some(jti) = claims.jti.as_deref() else {
            return ValidationOutcome::Invalid(InvalidReason::MissingClaim("jti"));
        };
        if !self.config.allowed_issuers.iter().any(|allowed| allowed == iss) {
            return ValidationOutcome::Invalid(InvalidReason::IssuerNotAllowed);
        }
        if aud != self.config.audience {
            return ValidationOutcome::Invalid(InvalidReason::AudienceMismatch);
        }

        // Phase 4: revocation.
        if self.revocations.is_revoked(jti) {
            return ValidationOutcome::Invalid(InvalidReason::Revoked);
        }

        // Phase 5/6: expiry, with optional renewal.
        let skewed_now = now.timestamp() - self.config.clock_skew_seconds;
        if exp <= skewed_now {
            if self.config.renewal_enabled {
                if let Some(client) = renewal_client {
                    if let Some(new_token) = client.renew(token_string).await {
                        return match Box::pin(self.validate(&new_token, required_permission, now, None)).await {
                            ValidationOutcome::Valid { .. } => ValidationOutcome::Valid {
                                renewed_token_string: Some(new_token),
                            },
                            other => other,
                        };
                    }
                }
            }
            return ValidationOutcome::Expired;
        }

        // Phase 7: authorization.
        if !required_permission.is_empty() && !claims.permissions.iter().any(|p| p == required_permission) {
            return ValidationOutcome::Forbidden;
        }

        ValidationOutcome::Valid { renewed_token_string: None }
    }
}

/// Recover `(sub, permissions)` from a token whose signature still
/// verifies, regardless of expiry: re-verifies the signature, then looks
/// up the original clientId and permissions from the old token's claims.
/// Returns `None` if the signature does not verify or required claims
/// are missing.
#[must_use]
pub fn recover_expired_claims(keys: &KeyRing, token_string: &str) -> Option<(String, Vec<String>)> {
    let (signing_input, payload, signature) = TokenValidator::split_and_decode(token_string)?;
    if !keys.verify_any(signing_input.as_bytes(), &signature) {
        return None;
    }
    let claims = TokenValidator::parse_claims(&payload)?;
    let sub = claims.sub?;
    Some((sub, claims.permissions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::HmacKey;

    fn minter_and_keys() -> (TokenMinter, KeyRing) {
        let key = HmacKey::new(b"test-signing-key-material".to_vec());
        let ring = KeyRing::single(key);
        (TokenMinter::new(ring.clone(), TokenConfig::default()), ring)
    }

    #[tokio::test]
    async fn mint_then_validate_round_trips() {
        let (minter, keys) = minter_and_keys();
        let now = Utc::now();
        let token = minter
            .mint("vendor_xyz", vec!["process_payment".to_string()], now)
            .unwrap();
        let revocations = RevocationRegistry::new();
        let validator = TokenValidator::new(&keys, minter.config(), &revocations);
        let outcome = validator
            .validate(&token.token_string, "process_payment", now, None)
            .await;
        assert_eq!(outcome, ValidationOutcome::Valid { renewed_token_string: None });
    }

    #[tokio::test]
    async fn validate_rejects_unknown_required_permission() {
        let (minter, keys) = minter_and_keys();
        let now = Utc::now();
        let token = minter.mint("vendor_xyz", vec![], now).unwrap();
        let revocations = RevocationRegistry::new();
        let validator = TokenValidator::new(&keys, minter.config(), &revocations);
        let outcome = validator
            .validate(&token.token_string, "process_payment", now, None)
            .await;
        assert_eq!(outcome, ValidationOutcome::Forbidden);
    }

    #[tokio::test]
    async fn validate_rejects_token_at_exactly_exp() {
        let (minter, keys) = minter_and_keys();
        let start = Utc::now();
        let token = minter.mint("vendor_xyz", vec![], start).unwrap();
        let revocations = RevocationRegistry::new();
        let mut config = minter.config().clone();
        config.renewal_enabled = false;
        let validator = TokenValidator::new(&keys, &config, &revocations);
        let at_exp = token.expires_at + chrono::Duration::seconds(config.clock_skew_seconds);
        let outcome = validator.validate(&token.token_string, "", at_exp, None).await;
        assert_eq!(outcome, ValidationOutcome::Expired);
    }

    #[tokio::test]
    async fn validate_accepts_token_one_second_before_exp() {
        let (minter, keys) = minter_and_keys();
        let start = Utc::now();
        let token = minter.mint("vendor_xyz", vec![], start).unwrap();
        let revocations = RevocationRegistry::new();
        let validator = TokenValidator::new(&keys, minter.config(), &revocations);
        let before_exp = token.expires_at - chrono::Duration::seconds(1);
        let outcome = validator.validate(&token.token_string, "", before_exp, None).await;
        assert_eq!(outcome, ValidationOutcome::Valid { renewed_token_string: None });
    }

    #[tokio::test]
    async fn validate_rejects_malformed_token() {
        let (_minter, keys) = minter_and_keys();
        let config = TokenConfig::default();
        let revocations = RevocationRegistry::new();
        let validator = TokenValidator::new(&keys, &config, &revocations);
        let outcome = validator.validate("not-a-token", "", Utc::now(), None).await;
        assert_eq!(outcome, ValidationOutcome::Invalid(InvalidReason::Malformed));
    }

    #[tokio::test]
    async fn validate_rejects_revoked_jti() {
        let (minter, keys) = minter_and_keys();
        let now = Utc::now();
        let token = minter.mint("vendor_xyz", vec![], now).unwrap();
        let revocations = RevocationRegistry::new();
        revocations.revoke(&token.jti, std::time::Duration::from_secs(60));
        let validator = TokenValidator::new(&keys, minter.config(), &revocations);
        let outcome = validator.validate(&token.token_string, "", now, None).await;
        assert_eq!(outcome, ValidationOutcome::Invalid(InvalidReason::Revoked));
    }
}
