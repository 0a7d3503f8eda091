//! EAPI configuration, loaded from `PAYGATE_*` env vars
//! with documented defaults.

use std::net::SocketAddr;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct VaultRetryConfig {
    pub base_ms: u64,
    pub factor: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct VaultCircuitBreakerConfig {
    pub threshold_pct: u32,
    pub window_size: usize,
    pub window_duration_seconds: u64,
    pub open_duration_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct EapiConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,

    pub token_lifetime_seconds: i64,
    pub token_clock_skew_seconds: i64,
    pub token_issuer: String,
    pub token_audience: String,
    pub token_allowed_issuers: Vec<String>,
    pub token_renewal_enabled: bool,
    pub token_renewal_threshold_seconds: i64,

    pub rotation_default_transition_period_seconds: i64,
    pub rotation_scheduler_interval: Duration,
    pub rotation_old_deprecated_grace_seconds: i64,

    pub vault_url: String,
    pub vault_cert_path: String,
    pub vault_key_path: String,
    pub vault_retry: VaultRetryConfig,
    pub vault_circuit_breaker: VaultCircuitBreakerConfig,

    pub cache_credential_ttl: Duration,

    pub database_url: String,

    pub signing_key: Vec<u8>,
    pub admin_token: String,
    pub sapi_base_url: String,
}

impl EapiConfig {
    /// Environment variables:
    /// - `PAYGATE_BIND_ADDR` (default `127.0.0.1:8400`)
    /// - `PAYGATE_LOG_LEVEL` (default `info`)
    /// - `PAYGATE_TOKEN_LIFETIME_SECONDS` (default `3600`)
    /// - `PAYGATE_TOKEN_CLOCK_SKEW_SECONDS` (default `30`)
    /// - `PAYGATE_TOKEN_ISSUER` (default `payment-eapi`)
    /// - `PAYGATE_TOKEN_AUDIENCE` (default `payment-sapi`)
    /// - `PAYGATE_TOKEN_ALLOWED_ISSUERS` (comma-separated, default the issuer)
    /// - `PAYGATE_TOKEN_RENEWAL_ENABLED` (default `true`)
    /// - `PAYGATE_TOKEN_RENEWAL_THRESHOLD_SECONDS` (default `60`)
    /// - `PAYGATE_ROTATION_DEFAULT_TRANSITION_PERIOD_MINUTES` (default `60`)
    /// - `PAYGATE_ROTATION_SCHEDULER_INTERVAL_MILLIS` (default `300000`)
    /// - `PAYGATE_ROTATION_OLD_DEPRECATED_GRACE_SECONDS` (default `900`)
    /// - `PAYGATE_VAULT_URL`, `PAYGATE_VAULT_CERT_PATH`, `PAYGATE_VAULT_KEY_PATH`
    /// - `PAYGATE_VAULT_RETRY_BASE_MS`, `PAYGATE_VAULT_RETRY_FACTOR`, `PAYGATE_VAULT_RETRY_MAX_ATTEMPTS`
    /// - `PAYGATE_VAULT_CB_THRESHOLD_PCT`, `PAYGATE_VAULT_CB_WINDOW_SIZE`,
    ///   `PAYGATE_VAULT_CB_WINDOW_DURATION_SECONDS`, `PAYGATE_VAULT_CB_OPEN_DURATION_SECONDS`
    /// - `PAYGATE_CACHE_CREDENTIAL_TTL_SECONDS` (default `30`)
    /// - `DATABASE_URL`
    /// - `PAYGATE_SIGNING_KEY` (raw key material; required)
    /// - `PAYGATE_ADMIN_TOKEN` (required)
    /// - `PAYGATE_SAPI_BASE_URL`
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = env_or("PAYGATE_BIND_ADDR", "127.0.0.1:8400")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8400)));

        let token_issuer = env_or("PAYGATE_TOKEN_ISSUER", "payment-eapi");
        let token_allowed_issuers = std::env::var("PAYGATE_TOKEN_ALLOWED_ISSUERS")
            .map(|v| v.split(',').map(str::trim).map(str::to_string).collect())
            .unwrap_or_else(|_| vec![token_issuer.clone()]);

        Self {
            bind_addr,
            log_level: env_or("PAYGATE_LOG_LEVEL", "info"),

            token_lifetime_seconds: env_parse("PAYGATE_TOKEN_LIFETIME_SECONDS", 3600),
            token_clock_skew_seconds: env_parse("PAYGATE_TOKEN_CLOCK_SKEW_SECONDS", 30),
            token_issuer,
            token_audience: env_or("PAYGATE_TOKEN_AUDIENCE", "payment-sapi"),
            token_allowed_issuers,
            token_renewal_enabled: env_parse("PAYGATE_TOKEN_RENEWAL_ENABLED", true),
            token_renewal_threshold_seconds: env_parse("PAYGATE_TOKEN_RENEWAL_THRESHOLD_SECONDS", 60),

            rotation_default_transition_period_seconds: env_parse::<i64>(
                "PAYGATE_ROTATION_DEFAULT_TRANSITION_PERIOD_MINUTES",
                60,
            ) * 60,
            rotation_scheduler_interval: Duration::from_millis(env_parse(
                "PAYGATE_ROTATION_SCHEDULER_INTERVAL_MILLIS",
                300_000,
            )),
            rotation_old_deprecated_grace_seconds: env_parse(
                "PAYGATE_ROTATION_OLD_DEPRECATED_GRACE_SECONDS",
                900,
            ),

            vault_url: env_or("PAYGATE_VAULT_URL", "https://vault.internal:8443"),
            vault_cert_path: env_or("PAYGATE_VAULT_CERT_PATH", "./vault-client.pem"),
            vault_key_path: env_or("PAYGATE_VAULT_KEY_PATH", "./vault-client-key.pem"),
            vault_retry: VaultRetryConfig {
                base_ms: env_parse("PAYGATE_VAULT_RETRY_BASE_MS", 100),
                factor: env_parse("PAYGATE_VAULT_RETRY_FACTOR", 2),
                max_attempts: env_parse("PAYGATE_VAULT_RETRY_MAX_ATTEMPTS", 5),
            },
            vault_circuit_breaker: VaultCircuitBreakerConfig {
                threshold_pct: env_parse("PAYGATE_VAULT_CB_THRESHOLD_PCT", 50),
                window_size: env_parse("PAYGATE_VAULT_CB_WINDOW_SIZE", 20),
                window_duration_seconds: env_parse("PAYGATE_VAULT_CB_WINDOW_DURATION_SECONDS", 10),
                open_duration_seconds: env_parse("PAYGATE_VAULT_CB_OPEN_DURATION_SECONDS", 30),
            },

            cache_credential_ttl: Duration::from_secs(env_parse("PAYGATE_CACHE_CREDENTIAL_TTL_SECONDS", 30)),

            database_url: env_or("DATABASE_URL", "postgres://localhost/paygate"),

            signing_key: env_or("PAYGATE_SIGNING_KEY", "dev-only-insecure-signing-key").into_bytes(),
            admin_token: env_or("PAYGATE_ADMIN_TOKEN", "dev-only-insecure-admin-token"),
            sapi_base_url: env_or("PAYGATE_SAPI_BASE_URL", "http://127.0.0.1:8401"),
        }
    }
}
