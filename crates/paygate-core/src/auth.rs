//! `AuthTranslator`, the EAPI core.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use paygate_vault::{ClientCredential, VaultClient};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::audit::{mask_client_id, AuthAuditEvent, AuthOutcome};
use crate::cache::TokenCache;
use crate::error::AuthError;
use crate::model::{token_cache_key, Token};
use crate::rotation::hash_secret;
use crate::singleflight::SingleFlight;
use crate::token::TokenMinter;

const MAX_CLIENT_ID_LEN: usize = 128;
const MAX_SECRET_LEN: usize = 1024;
/// Salt used only to compute a dummy comparison when no credential is
/// found, so an unknown clientId costs the same constant-time hash work as
/// a known one with a wrong secret.
const DUMMY_SALT: &str = "unknown-client-dummy-salt";

fn is_valid_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && client_id.len() <= MAX_CLIENT_ID_LEN
        && client_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Tunables for `authenticate()`.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Permissions granted to every successfully authenticated client.
    /// Per-vendor permission derivation is vendor onboarding, out of scope
    /// here; a gateway-wide static set is the conservative default recorded
    /// in `DESIGN.md`.
    pub default_permissions: Vec<String>,
    /// A cached token within this many seconds of expiry is not reused;
    /// a fresh one is minted instead.
    pub renewal_threshold_seconds: i64,
    pub credential_cache_ttl: Duration,
    /// Consecutive failures within `brute_force_window` before backoff
    /// kicks in; exact N/T and the backoff curve are left to the
    /// implementation. Defaults recorded in `DESIGN.md`.
    pub brute_force_threshold: u32,
    pub brute_force_window: Duration,
    pub brute_force_base_backoff: Duration,
    pub brute_force_max_backoff: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_permissions: vec!["process_payment".to_string(), "view_status".to_string()],
            renewal_threshold_seconds: 60,
            credential_cache_ttl: Duration::from_secs(30),
            brute_force_threshold: 5,
            brute_force_window: Duration::from_secs(60),
            brute_force_base_backoff: Duration::from_millis(200),
            brute_force_max_backoff: Duration::from_secs(10),
        }
    }
}

/// Per-clientId rolling success/failure counters. No metrics
/// exporter is built (non-goal); counters are tracked in-process and
/// surfaced only through logs, not exported to any metrics backend.
struct ClientCounters {
    successes: AtomicU64,
    failures: AtomicU64,
    /// Rolling consecutive-failure window for brute-force backoff
    ///, guarded separately since it tracks both a count
    /// and a window start timestamp together.
    brute_force: Mutex<BruteForceState>,
}

impl Default for ClientCounters {
    fn default() -> Self {
        Self {
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            brute_force: Mutex::new(BruteForceState { consecutive_failures: 0, window_start: None }),
        }
    }
}

struct BruteForceState {
    consecutive_failures: u32,
    window_start: Option<DateTime<Utc>>,
}

/// Outcome of a successful `authenticate()` call.
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub token: Token,
    /// Set when the credential used to authenticate came from the local
    /// `CredentialCache` fallback because the vault could not be reached.
    pub degraded: bool,
}

/// Orchestrates header validation, cache lookup, vault fetch, credential
/// matching, and token minting.
pub struct AuthTranslator<V> {
    vault: V,
    minter: TokenMinter,
    token_cache: TokenCache,
    credential_cache: paygate_vault::TtlCache<ClientCredential>,
    single_flight: SingleFlight,
    counters: DashMap<String, ClientCounters>,
    config: AuthConfig,
}

impl<V: VaultClient> AuthTranslator<V> {
    pub fn new(vault: V, minter: TokenMinter, config: AuthConfig) -> Self {
        Self {
            vault,
            minter,
            token_cache: TokenCache::new(),
            credential_cache: paygate_vault::TtlCache::new(),
            single_flight: SingleFlight::new(),
            counters: DashMap::new(),
            config,
        }
    }

    #[must_use]
    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    fn record_outcome(&self, client_id: &str, success: bool) {
        let entry = self.counters.entry(client_id.to_string()).or_default();
        if success {
            entry.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Updates the rolling brute-force window for a failed attempt and
    /// returns how long the caller should delay the response (zero until
    /// `brute_force_threshold` consecutive failures land inside
    /// `brute_force_window`). Does not lock the account out: a sustained
    /// run past the threshold only escalates the delay and logs a security
    /// alert, it never blocks authentication outright.
    fn register_failure_and_backoff(&self, client_id: &str, now: DateTime<Utc>) -> Duration {
        let entry = self.counters.entry(client_id.to_string()).or_default();
        let mut state = entry.brute_force.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let window_expired = match state.window_start {
            Some(start) => (now - start).num_seconds() as u64 > self.config.brute_force_window.as_secs(),
            None => true,
        };
        if window_expired {
            state.window_start = Some(now);
            state.consecutive_failures = 1;
        } else {
            state.consecutive_failures += 1;
        }

        if state.consecutive_failures < self.config.brute_force_threshold {
            return Duration::ZERO;
        }

        let escalations = state.consecutive_failures - self.config.brute_force_threshold;
        let backoff = self
            .config
            .brute_force_base_backoff
            .saturating_mul(1u32.checked_shl(escalations.min(16)).unwrap_or(u32::MAX))
            .min(self.config.brute_force_max_backoff);

        tracing::warn!(
            client_id = %mask_client_id(client_id),
            consecutive_failures = state.consecutive_failures,
            backoff_ms = backoff.as_millis() as u64,
            "brute-force threshold exceeded, escalating backoff; account not locked"
        );

        backoff
    }

    fn clear_brute_force(&self, client_id: &str) {
        if let Some(entry) = self.counters.get(client_id) {
            let mut state = entry.brute_force.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            state.consecutive_failures = 0;
            state.window_start = None;
        }
    }

    /// Validates a client's credentials against the vault and mints a token.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
        source_addr: Option<String>,
        request_id: Option<String>,
    ) -> Result<AuthSuccess, AuthError> {
        let request_id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if client_id.is_empty() || client_secret.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !is_valid_client_id(client_id) {
            return Err(AuthError::MalformedCredentials("clientId failed format validation".to_string()));
        }
        if client_secret.len() > MAX_SECRET_LEN {
            return Err(AuthError::MalformedCredentials("secret exceeds maximum length".to_string()));
        }

        let cache_key = token_cache_key(client_id, &self.config.default_permissions);
        let now = Utc::now();
        if let Some(cached) = self.token_cache.get(&cache_key) {
            if cached.remaining_ttl(now).as_secs() as i64 > self.config.renewal_threshold_seconds {
                return Ok(AuthSuccess { token: cached, degraded: false });
            }
        }

        let (credential, degraded) = match self.fetch_credential(client_id).await {
            Ok(result) => result,
            Err(AuthError::UpstreamUnavailable) => {
                self.record_outcome(client_id, false);
                return Err(AuthError::UpstreamUnavailable);
            }
            Err(other) => return Err(other),
        };

        let Some(credential) = credential else {
            // Unknown clientId: still pay the hashing cost so latency
            // matches the wrong-secret path.
            let dummy_hash = hash_secret(DUMMY_SALT, DUMMY_SALT);
            let _ = hash_secret(client_secret, DUMMY_SALT).as_bytes().ct_eq(dummy_hash.as_bytes());
            self.record_outcome(client_id, false);
            self.emit_failure_audit(client_id, &source_addr, &request_id, degraded);
            let backoff = self.register_failure_and_backoff(client_id, now);
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            return Err(AuthError::AuthenticationFailed);
        };

        let mut matched_version_id = None;
        for version in credential.authenticatable_versions() {
            let candidate_hash = hash_secret(client_secret, &version.salt);
            let matches = candidate_hash.as_bytes().ct_eq(version.hashed_secret.as_bytes()).into();
            if matches && matched_version_id.is_none() {
                matched_version_id = Some(version.version_id.clone());
            }
        }

        let Some(matched_version_id) = matched_version_id else {
            self.record_outcome(client_id, false);
            self.emit_failure_audit(client_id, &source_addr, &request_id, degraded);
            let backoff = self.register_failure_and_backoff(client_id, now);
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            return Err(AuthError::AuthenticationFailed);
        };

        let token = self
            .minter
            .mint(client_id, self.config.default_permissions.clone(), now)
            .map_err(|_| AuthError::System("signing key unavailable".to_string()))?;
        self.token_cache.put(cache_key, token.clone(), token.remaining_ttl(now));
        self.record_outcome(client_id, true);
        self.clear_brute_force(client_id);

        AuthAuditEvent {
            timestamp: now,
            client_id_masked: mask_client_id(client_id),
            outcome: AuthOutcome::Success,
            matched_version_id: Some(matched_version_id),
            source_addr,
            request_id,
            degraded,
        }
        .emit();

        Ok(AuthSuccess { token, degraded })
    }

    fn emit_failure_audit(&self, client_id: &str, source_addr: &Option<String>, request_id: &str, degraded: bool) {
        AuthAuditEvent {
            timestamp: Utc::now(),
            client_id_masked: mask_client_id(client_id),
            outcome: AuthOutcome::Failure,
            matched_version_id: None,
            source_addr: source_addr.clone(),
            request_id: request_id.to_string(),
            degraded,
        }
        .emit();
    }

    /// Returns `(Some(credential), degraded)` on a vault or cache hit,
    /// `(None, _)` if the vault confirmed the client does not exist, or
    /// `Err(UpstreamUnavailable)` if neither the vault nor the cache could
    /// answer.
    async fn fetch_credential(&self, client_id: &str) -> Result<(Option<ClientCredential>, bool), AuthError> {
        let vault = &self.vault;
        let cache = &self.credential_cache;
        let ttl = self.config.credential_cache_ttl;
        self.single_flight
            .run(client_id, || async move {
                // Double-checked: a concurrent caller that won the race to
                // acquire this key's lock may have already populated the
                // cache, in which case there's nothing left for this one to
                // fetch. Without this, every queued caller still repeats the
                // vault round-trip once it's their turn, serialized but not
                // coalesced.
                if let Some(cached) = cache.get(client_id) {
                    return Ok((Some(cached), false));
                }
                match vault.get_credential(client_id).await {
                    Ok(credential) => {
                        cache.put(client_id, credential.clone(), ttl);
                        Ok((Some(credential), false))
                    }
                    Err(paygate_vault::VaultError::NotFound(_)) => Ok((None, false)),
                    Err(err) => match cache.get(client_id) {
                        Some(cached) => {
                            tracing::warn!(client_id, error = %err, "serving cached credential, vault unavailable");
                            Ok((Some(cached), true))
                        }
                        None => Err(AuthError::UpstreamUnavailable),
                    },
                }
            })
            .await
    }

    /// Second half of in-band renewal: having already recovered a verified
    /// expired token's `(clientId, permissions)`, confirm the client still
    /// has at least one authenticatable credential version (active or
    /// dual-active) before minting a replacement.
    pub async fn authenticate_for_renewal(&self, client_id: &str, permissions: Vec<String>) -> Result<Token, AuthError> {
        let still_credentialed = self
            .vault
            .get_active_credential_versions(client_id)
            .await
            .map(|versions| !versions.is_empty())
            .unwrap_or(false);
        if !still_credentialed {
            return Err(AuthError::AuthenticationFailed);
        }
        let now = Utc::now();
        self.minter
            .mint(client_id, permissions, now)
            .map_err(|_| AuthError::System("signing key unavailable".to_string()))
    }

    /// Revokes every token currently cached for this client, so a fresh
    /// authentication is required on the next request.
    pub fn revoke(&self, client_id: &str, revocations: &crate::revocation::RevocationRegistry, now: chrono::DateTime<Utc>) {
        for key in [client_id.to_string(), token_cache_key(client_id, &self.config.default_permissions)] {
            if let Some(token) = self.token_cache.get(&key) {
                revocations.revoke(&token.jti, token.remaining_ttl(now));
            }
        }
        self.token_cache.evict_by_prefix(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{HmacKey, KeyRing};
    use crate::token::TokenConfig;
    use async_trait::async_trait;
    use paygate_vault::{CredentialVersion, VersionStatus};
    use std::sync::Arc;

    struct FakeVault {
        credential: Option<ClientCredential>,
    }

    #[async_trait]
    impl VaultClient for FakeVault {
        async fn get_credential(&self, client_id: &str) -> Result<ClientCredential, paygate_vault::VaultError> {
            self.credential
                .clone()
                .filter(|c| c.client_id == client_id)
                .ok_or_else(|| paygate_vault::VaultError::NotFound(client_id.to_string()))
        }

        async fn get_active_credential_versions(
            &self,
            _client_id: &str,
        ) -> Result<Vec<CredentialVersion>, paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn store_new_credential_version(
            &self,
            _client_id: &str,
            _hashed_secret: &str,
            _salt: &str,
        ) -> Result<CredentialVersion, paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn configure_credential_transition(
            &self,
            _client_id: &str,
            _primary_version_id: &str,
            _secondary_version_id: Option<&str>,
        ) -> Result<(), paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn disable_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn remove_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }
    }

    fn translator_with_secret(client_id: &str, raw_secret: &str) -> AuthTranslator<FakeVault> {
        let salt = "fixed-salt";
        let version = CredentialVersion {
            version_id: "v1".to_string(),
            hashed_secret: hash_secret(raw_secret, salt),
            salt: salt.to_string(),
            status: VersionStatus::Active,
            created_at: Utc::now(),
        };
        let credential = ClientCredential { client_id: client_id.to_string(), versions: vec![version] };
        let keys = KeyRing::single(HmacKey::new(b"key".to_vec()));
        let minter = TokenMinter::new(keys, TokenConfig::default());
        AuthTranslator::new(FakeVault { credential: Some(credential) }, minter, AuthConfig::default())
    }

    #[tokio::test]
    async fn happy_path_mints_token_with_expected_claims() {
        let translator = translator_with_secret("vendor_xyz", "s3cr3t-A");
        let result = translator.authenticate("vendor_xyz", "s3cr3t-A", None, None).await.unwrap();
        assert_eq!(result.token.client_id, "vendor_xyz");
        assert_eq!(result.token.issuer, "payment-eapi");
        assert_eq!(result.token.audience, "payment-sapi");
        assert_eq!(result.token.permissions, vec!["process_payment", "view_status"]);
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn wrong_secret_is_authentication_failed() {
        let translator = translator_with_secret("vendor_xyz", "s3cr3t-A");
        let result = translator.authenticate("vendor_xyz", "bogus", None, None).await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn unknown_client_id_is_authentication_failed_not_a_distinct_error() {
        let translator = translator_with_secret("vendor_xyz", "s3cr3t-A");
        let result = translator.authenticate("someone_else", "whatever", None, None).await;
        assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn malformed_client_id_is_rejected_before_vault_lookup() {
        let translator = translator_with_secret("vendor_xyz", "s3cr3t-A");
        let too_long = "a".repeat(129);
        let result = translator.authenticate(&too_long, "whatever", None, None).await;
        assert!(matches!(result, Err(AuthError::MalformedCredentials(_))));
    }

    #[tokio::test]
    async fn missing_credentials_rejected() {
        let translator = translator_with_secret("vendor_xyz", "s3cr3t-A");
        let result = translator.authenticate("", "", None, None).await;
        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }

    #[tokio::test]
    async fn repeated_failures_do_not_lock_out_eventual_success() {
        let mut config = AuthConfig::default();
        config.brute_force_threshold = 2;
        config.brute_force_base_backoff = Duration::from_millis(1);
        config.brute_force_max_backoff = Duration::from_millis(5);
        let salt = "fixed-salt";
        let version = CredentialVersion {
            version_id: "v1".to_string(),
            hashed_secret: hash_secret("s3cr3t-A", salt),
            salt: salt.to_string(),
            status: VersionStatus::Active,
            created_at: Utc::now(),
        };
        let credential = ClientCredential { client_id: "vendor_xyz".to_string(), versions: vec![version] };
        let keys = KeyRing::single(HmacKey::new(b"key".to_vec()));
        let minter = TokenMinter::new(keys, TokenConfig::default());
        let translator = AuthTranslator::new(FakeVault { credential: Some(credential) }, minter, config);

        for _ in 0..4 {
            let result = translator.authenticate("vendor_xyz", "bogus", None, None).await;
            assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
        }

        // Backoff escalates but never refuses a correct secret afterward.
        let result = translator.authenticate("vendor_xyz", "s3cr3t-A", None, None).await;
        assert!(result.is_ok());
    }

    struct CountingVault {
        credential: ClientCredential,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl VaultClient for CountingVault {
        async fn get_credential(&self, client_id: &str) -> Result<ClientCredential, paygate_vault::VaultError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if client_id == self.credential.client_id {
                Ok(self.credential.clone())
            } else {
                Err(paygate_vault::VaultError::NotFound(client_id.to_string()))
            }
        }

        async fn get_active_credential_versions(
            &self,
            _client_id: &str,
        ) -> Result<Vec<CredentialVersion>, paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn store_new_credential_version(
            &self,
            _client_id: &str,
            _hashed_secret: &str,
            _salt: &str,
        ) -> Result<CredentialVersion, paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn configure_credential_transition(
            &self,
            _client_id: &str,
            _primary_version_id: &str,
            _secondary_version_id: Option<&str>,
        ) -> Result<(), paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn disable_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }

        async fn remove_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), paygate_vault::VaultError> {
            unimplemented!("not exercised")
        }
    }

    #[tokio::test]
    async fn concurrent_misses_for_the_same_client_coalesce_into_one_vault_round_trip() {
        let salt = "fixed-salt";
        let version = CredentialVersion {
            version_id: "v1".to_string(),
            hashed_secret: hash_secret("s3cr3t-A", salt),
            salt: salt.to_string(),
            status: VersionStatus::Active,
            created_at: Utc::now(),
        };
        let credential = ClientCredential { client_id: "vendor_xyz".to_string(), versions: vec![version] };
        let keys = KeyRing::single(HmacKey::new(b"key".to_vec()));
        let minter = TokenMinter::new(keys, TokenConfig::default());
        let vault = CountingVault { credential, calls: std::sync::atomic::AtomicUsize::new(0) };
        let translator = Arc::new(AuthTranslator::new(vault, minter, AuthConfig::default()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let translator = translator.clone();
            handles.push(tokio::spawn(async move {
                translator.authenticate("vendor_xyz", "s3cr3t-A", None, None).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }

        assert_eq!(translator.vault.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
