//! Retry, circuit-breaking, and cache-fallback around a [`VaultClient`].
//!
//! The vault is an external dependency the gateway cannot control the
//! availability of. This module is the
//! seam that turns "the vault is flaky" into "reads serve from cache,
//! writes fail fast" rather than letting every caller reinvent backoff.
//!
//! The circuit breaker's state machine follows the conventional
//! closed/open/half-open shape; the implementation here is self-contained
//! since pulling in a whole resilience crate for one breaker would be
//! overkill.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use tracing::warn;

use crate::cache::TtlCache;
use crate::client::VaultClient;
use crate::error::VaultError;
use crate::model::{ClientCredential, CredentialVersion, VersionStatus};

/// Governs retry attempts made against the vault for a single call.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            factor: 2,
        }
    }
}

/// Full-jitter exponential backoff: `rand(0, min(max_delay, base * factor^attempt))`.
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay.saturating_mul(config.factor.saturating_pow(attempt.min(16)));
    let capped = exp.min(config.max_delay);
    let jittered_millis = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64);
    Duration::from_millis(jittered_millis)
}

async fn retry_with_backoff<T, F, Fut>(
    operation: &str,
    config: &RetryConfig,
    mut attempt_fn: F,
) -> Result<T, VaultError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, VaultError>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts => {
                let delay = backoff_delay(config, attempt);
                warn!(operation, attempt, delay_ms = %delay.as_millis(), "retrying vault call");
                tokio::time::sleep(delay).await;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| VaultError::TransientIo(format!("{operation}: exhausted retries"))))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

/// One recorded call outcome, timestamped against the registry's epoch.
struct CallRecord {
    success: bool,
    at_millis: u64,
}

/// Per-operation circuit breaker state: a phase plus a rolling log of the
/// last `window_size` call outcomes (used for both the count-based and
/// time-based trip checks).
struct Breaker {
    phase: std::sync::Mutex<BreakerPhase>,
    calls: std::sync::Mutex<VecDeque<CallRecord>>,
    opened_at_millis: AtomicU64,
}

impl Breaker {
    fn new() -> Self {
        Self {
            phase: std::sync::Mutex::new(BreakerPhase::Closed),
            calls: std::sync::Mutex::new(VecDeque::new()),
            opened_at_millis: AtomicU64::new(0),
        }
    }
}

/// Tunables for [`CircuitBreakerRegistry`].
///
/// The breaker trips open once failures reach `threshold_pct` percent of
/// calls, measured over either of two overlapping windows: the last
/// `window_size` calls, or calls within the last `window_duration` —
/// whichever of the two currently has enough history to answer. An
/// alternating success/failure stream sits at 50% forever and would never
/// trip a consecutive-failure counter; the percentage-over-window check
/// catches it correctly.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub threshold_pct: u32,
    pub window_size: usize,
    pub window_duration: Duration,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold_pct: 50,
            window_size: 20,
            window_duration: Duration::from_secs(10),
            open_duration: Duration::from_secs(30),
        }
    }
}

/// One circuit breaker per vault operation name, so a failing write path
/// does not trip the breaker guarding reads.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<Breaker>>,
    epoch: Instant,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            epoch: Instant::now(),
        }
    }

    fn breaker_for(&self, operation: &str) -> Arc<Breaker> {
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(Breaker::new()))
            .clone()
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Returns `Ok(())` if the call is allowed to proceed, transitioning
    /// `Open` -> `HalfOpen` once `open_duration` has elapsed.
    fn admit(&self, operation: &str, breaker: &Breaker) -> Result<(), VaultError> {
        let mut phase = breaker.phase.lock().unwrap_or_else(|p| p.into_inner());
        match *phase {
            BreakerPhase::Closed | BreakerPhase::HalfOpen => Ok(()),
            BreakerPhase::Open => {
                let opened_at = breaker.opened_at_millis.load(Ordering::Relaxed);
                if self.now_millis().saturating_sub(opened_at) >= self.config.open_duration.as_millis() as u64 {
                    *phase = BreakerPhase::HalfOpen;
                    Ok(())
                } else {
                    Err(VaultError::CircuitOpen(operation.to_string()))
                }
            }
        }
    }

    /// Appends an outcome to the rolling log, capped at `window_size`
    /// entries, and returns whether the failure rate over either window
    /// (count-based or time-based) has reached `threshold_pct`.
    fn record_outcome_and_check_trip(&self, breaker: &Breaker, success: bool, now: u64) -> bool {
        let mut calls = breaker.calls.lock().unwrap_or_else(|p| p.into_inner());
        calls.push_back(CallRecord { success, at_millis: now });
        while calls.len() > self.config.window_size {
            calls.pop_front();
        }

        let count_total = calls.len() as u32;
        let count_failures = calls.iter().filter(|c| !c.success).count() as u32;
        let count_trips = count_total > 0 && count_failures * 100 >= self.config.threshold_pct * count_total;

        let window_start = now.saturating_sub(self.config.window_duration.as_millis() as u64);
        let (time_total, time_failures) = calls
            .iter()
            .filter(|c| c.at_millis >= window_start)
            .fold((0u32, 0u32), |(total, failures), c| (total + 1, failures + u32::from(!c.success)));
        let time_trips = time_total > 0 && time_failures * 100 >= self.config.threshold_pct * time_total;

        count_trips || time_trips
    }

    fn record_success(&self, breaker: &Breaker) {
        let now = self.now_millis();
        let should_trip = self.record_outcome_and_check_trip(breaker, true, now);
        let mut phase = breaker.phase.lock().unwrap_or_else(|p| p.into_inner());
        match *phase {
            // A successful probe closes the circuit and clears history so a
            // stale failure-heavy window doesn't immediately reopen it.
            BreakerPhase::HalfOpen => {
                *phase = BreakerPhase::Closed;
                breaker.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
            }
            BreakerPhase::Closed if should_trip => {
                *phase = BreakerPhase::Open;
                breaker.opened_at_millis.store(now, Ordering::Relaxed);
            }
            BreakerPhase::Closed | BreakerPhase::Open => {}
        }
    }

    fn record_failure(&self, breaker: &Breaker) {
        let now = self.now_millis();
        let should_trip = self.record_outcome_and_check_trip(breaker, false, now);
        let mut phase = breaker.phase.lock().unwrap_or_else(|p| p.into_inner());
        match *phase {
            // A failed probe reopens the circuit immediately, independent
            // of the window check.
            BreakerPhase::HalfOpen => {
                *phase = BreakerPhase::Open;
                breaker.opened_at_millis.store(now, Ordering::Relaxed);
            }
            BreakerPhase::Closed if should_trip => {
                *phase = BreakerPhase::Open;
                breaker.opened_at_millis.store(now, Ordering::Relaxed);
            }
            BreakerPhase::Closed | BreakerPhase::Open => {}
        }
    }

    /// Run `f` guarded by the named operation's breaker.
    async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, VaultError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, VaultError>>,
    {
        let breaker = self.breaker_for(operation);
        self.admit(operation, &breaker)?;
        match f().await {
            Ok(value) => {
                self.record_success(&breaker);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(&breaker);
                Err(err)
            }
        }
    }
}

/// Decorates a [`VaultClient`] with retry, a per-operation circuit breaker,
/// and read-path cache fallback.
///
/// Reads (`get_credential`, `get_active_credential_versions`) that fail
/// after retries and a closed circuit fall back to the last known-good
/// cached value, if any, and are flagged by callers as a degraded response
///. Writes never fall back to cache; they fail fast so the
/// caller (the `RotationCoordinator`) can surface the failure rather than
/// silently losing a credential change.
pub struct ResilientVaultClient<C> {
    inner: C,
    retry: RetryConfig,
    breakers: CircuitBreakerRegistry,
    credential_cache: TtlCache<ClientCredential>,
    active_versions_cache: TtlCache<Vec<CredentialVersion>>,
    cache_ttl: Duration,
}

impl<C: VaultClient> ResilientVaultClient<C> {
    pub fn new(inner: C, retry: RetryConfig, breaker_config: CircuitBreakerConfig, cache_ttl: Duration) -> Self {
        Self {
            inner,
            retry,
            breakers: CircuitBreakerRegistry::new(breaker_config),
            credential_cache: TtlCache::new(),
            active_versions_cache: TtlCache::new(),
            cache_ttl,
        }
    }

    /// Whether the last read for `client_id` served from cache because the
    /// vault was unreachable. Exposed so `AuthTranslator` can set the
    /// `degraded` flag on its audit event.
    #[must_use]
    pub fn has_cached_credential(&self, client_id: &str) -> bool {
        self.credential_cache.get(client_id).is_some()
    }
}

#[async_trait]
impl<C: VaultClient> VaultClient for ResilientVaultClient<C> {
    async fn get_credential(&self, client_id: &str) -> Result<ClientCredential, VaultError> {
        let op = "get_credential";
        let result = self
            .breakers
            .call(op, || async {
                retry_with_backoff(op, &self.retry, || self.inner.get_credential(client_id)).await
            })
            .await;

        match result {
            Ok(credential) => {
                self.credential_cache
                    .put(client_id, credential.clone(), self.cache_ttl);
                Ok(credential)
            }
            Err(err) => match self.credential_cache.get(client_id) {
                Some(cached) => {
                    warn!(client_id, error = %err, "serving cached credential, vault unavailable");
                    Ok(cached)
                }
                None => Err(err),
            },
        }
    }

    async fn get_active_credential_versions(
        &self,
        client_id: &str,
    ) -> Result<Vec<CredentialVersion>, VaultError> {
        let op = "get_active_credential_versions";
        let result = self
            .breakers
            .call(op, || async {
                retry_with_backoff(op, &self.retry, || {
                    self.inner.get_active_credential_versions(client_id)
                })
                .await
            })
            .await;

        match result {
            Ok(versions) => {
                self.active_versions_cache
                    .put(client_id, versions.clone(), self.cache_ttl);
                Ok(versions)
            }
            Err(err) => match self.active_versions_cache.get(client_id) {
                Some(cached) => {
                    warn!(client_id, error = %err, "serving cached active versions, vault unavailable");
                    Ok(cached)
                }
                None => Err(err),
            },
        }
    }

    async fn store_new_credential_version(
        &self,
        client_id: &str,
        hashed_secret: &str,
        salt: &str,
    ) -> Result<CredentialVersion, VaultError> {
        let op = "store_new_credential_version";
        let result = self
            .breakers
            .call(op, || async {
                retry_with_backoff(op, &self.retry, || {
                    self.inner
                        .store_new_credential_version(client_id, hashed_secret, salt)
                })
                .await
            })
            .await?;
        self.credential_cache.evict(client_id);
        self.active_versions_cache.evict(client_id);
        Ok(result)
    }

    async fn configure_credential_transition(
        &self,
        client_id: &str,
        primary_version_id: &str,
        secondary_version_id: Option<&str>,
    ) -> Result<(), VaultError> {
        let op = "configure_credential_transition";
        self.breakers
            .call(op, || async {
                retry_with_backoff(op, &self.retry, || {
                    self.inner.configure_credential_transition(
                        client_id,
                        primary_version_id,
                        secondary_version_id,
                    )
                })
                .await
            })
            .await?;
        self.credential_cache.evict(client_id);
        self.active_versions_cache.evict(client_id);
        Ok(())
    }

    async fn disable_credential_version(
        &self,
        client_id: &str,
        version_id: &str,
    ) -> Result<(), VaultError> {
        let op = "disable_credential_version";
        self.breakers
            .call(op, || async {
                retry_with_backoff(op, &self.retry, || {
                    self.inner.disable_credential_version(client_id, version_id)
                })
                .await
            })
            .await?;
        self.credential_cache.evict(client_id);
        self.active_versions_cache.evict(client_id);
        Ok(())
    }

    async fn remove_credential_version(
        &self,
        client_id: &str,
        version_id: &str,
    ) -> Result<(), VaultError> {
        let op = "remove_credential_version";
        self.breakers
            .call(op, || async {
                retry_with_backoff(op, &self.retry, || {
                    self.inner.remove_credential_version(client_id, version_id)
                })
                .await
            })
            .await?;
        self.credential_cache.evict(client_id);
        self.active_versions_cache.evict(client_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionStatus;
    use std::sync::atomic::AtomicUsize;

    struct FlakyThenOk {
        calls: AtomicUsize,
        fail_times: usize,
    }

    #[async_trait]
    impl VaultClient for FlakyThenOk {
        async fn get_credential(&self, client_id: &str) -> Result<ClientCredential, VaultError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(VaultError::TransientIo("boom".into()));
            }
            Ok(ClientCredential {
                client_id: client_id.to_string(),
                versions: vec![CredentialVersion {
                    version_id: "v1".into(),
                    hashed_secret: "h".into(),
                    salt: "s".into(),
                    status: VersionStatus::Active,
                    created_at: chrono::Utc::now(),
                }],
            })
        }

        async fn get_active_credential_versions(
            &self,
            _client_id: &str,
        ) -> Result<Vec<CredentialVersion>, VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn store_new_credential_version(
            &self,
            _client_id: &str,
            _hashed_secret: &str,
            _salt: &str,
        ) -> Result<CredentialVersion, VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn configure_credential_transition(
            &self,
            _client_id: &str,
            _primary_version_id: &str,
            _secondary_version_id: Option<&str>,
        ) -> Result<(), VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn disable_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn remove_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), VaultError> {
            unimplemented!("not exercised in this test")
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let client = ResilientVaultClient::new(
            FlakyThenOk {
                calls: AtomicUsize::new(0),
                fail_times: 2,
            },
            RetryConfig {
                max_attempts: 5,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                factor: 2,
            },
            CircuitBreakerConfig::default(),
            Duration::from_secs(60),
        );
        let result = client.get_credential("acct_123").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_cache() {
        let client = ResilientVaultClient::new(
            FlakyThenOk {
                calls: AtomicUsize::new(0),
                fail_times: 1,
            },
            RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                factor: 2,
            },
            CircuitBreakerConfig::default(),
            Duration::from_secs(60),
        );
        let first = client.get_credential("acct_123").await;
        assert!(first.is_ok());

        let flaky_always_fails = ResilientVaultClient::new(
            FlakyThenOk {
                calls: AtomicUsize::new(0),
                fail_times: usize::MAX,
            },
            RetryConfig {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                factor: 2,
            },
            CircuitBreakerConfig::default(),
            Duration::from_secs(60),
        );
        flaky_always_fails
            .credential_cache
            .put("acct_123", first.unwrap(), Duration::from_secs(60));
        let second = flaky_always_fails.get_credential("acct_123").await;
        assert!(second.is_ok());
        assert!(flaky_always_fails.has_cached_credential("acct_123"));
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_rejects_without_cache() {
        let client = ResilientVaultClient::new(
            FlakyThenOk {
                calls: AtomicUsize::new(0),
                fail_times: usize::MAX,
            },
            RetryConfig {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                factor: 2,
            },
            CircuitBreakerConfig {
                threshold_pct: 50,
                window_size: 2,
                window_duration: Duration::from_secs(10),
                open_duration: Duration::from_secs(30),
            },
            Duration::from_secs(60),
        );
        for _ in 0..2 {
            let _ = client.get_credential("acct_999").await;
        }
        let result = client.get_credential("acct_999").await;
        assert!(matches!(result, Err(VaultError::CircuitOpen(_))));
    }

    /// An alternating success/failure stream sits at exactly 50% failures
    /// forever and never produces two *consecutive* failures — a
    /// consecutive-failure counter would never trip on it. The
    /// percentage-over-window rule must still catch it once enough calls
    /// have landed in the window.
    struct Alternating {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VaultClient for Alternating {
        async fn get_credential(&self, client_id: &str) -> Result<ClientCredential, VaultError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call % 2 == 0 {
                return Err(VaultError::TransientIo("boom".into()));
            }
            Ok(ClientCredential {
                client_id: client_id.to_string(),
                versions: vec![CredentialVersion {
                    version_id: "v1".into(),
                    hashed_secret: "h".into(),
                    salt: "s".into(),
                    status: VersionStatus::Active,
                    created_at: chrono::Utc::now(),
                }],
            })
        }

        async fn get_active_credential_versions(
            &self,
            _client_id: &str,
        ) -> Result<Vec<CredentialVersion>, VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn store_new_credential_version(
            &self,
            _client_id: &str,
            _hashed_secret: &str,
            _salt: &str,
        ) -> Result<CredentialVersion, VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn configure_credential_transition(
            &self,
            _client_id: &str,
            _primary_version_id: &str,
            _secondary_version_id: Option<&str>,
        ) -> Result<(), VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn disable_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), VaultError> {
            unimplemented!("not exercised in this test")
        }

        async fn remove_credential_version(
            &self,
            _client_id: &str,
            _version_id: &str,
        ) -> Result<(), VaultError> {
            unimplemented!("not exercised in this test")
        }
    }

    #[tokio::test]
    async fn alternating_failures_at_threshold_pct_trip_the_windowed_breaker() {
        let client = ResilientVaultClient::new(
            Alternating { calls: AtomicUsize::new(0) },
            RetryConfig {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                factor: 2,
            },
            CircuitBreakerConfig {
                threshold_pct: 50,
                window_size: 4,
                window_duration: Duration::from_secs(10),
                open_duration: Duration::from_secs(30),
            },
            Duration::from_secs(60),
        );
        // fail, ok, fail, ok — never two consecutive failures, but the
        // window is at exactly 50% failures once it fills.
        for _ in 0..4 {
            let _ = client.get_credential("acct_alt").await;
        }
        let result = client.get_credential("acct_alt").await;
        assert!(matches!(result, Err(VaultError::CircuitOpen(_))));
    }
}
