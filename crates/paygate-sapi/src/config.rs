//! SAPI configuration, loaded from `PAYGATE_*` env vars,
//! mirroring `paygate_eapi::config::EapiConfig`'s shape.

use std::net::SocketAddr;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct SapiConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,

    pub token_clock_skew_seconds: i64,
    pub token_issuer: String,
    pub token_audience: String,
    pub token_allowed_issuers: Vec<String>,
    pub token_renewal_enabled: bool,

    /// Must match the EAPI instance's signing key material so verification
    /// succeeds under the same HMAC key.
    pub signing_key: Vec<u8>,

    /// Base URL of the EAPI instance hosting the renewal endpoint.
    pub eapi_base_url: String,

    /// Base URL of the internal payment backend payments are ultimately
    /// forwarded to. This service only needs somewhere to proxy to; the
    /// backend's own processing logic is someone else's concern.
    pub payment_backend_url: String,
}

impl SapiConfig {
    /// Environment variables:
    /// - `PAYGATE_SAPI_BIND_ADDR` (default `127.0.0.1:8401`)
    /// - `PAYGATE_LOG_LEVEL` (default `info`)
    /// - `PAYGATE_TOKEN_CLOCK_SKEW_SECONDS` (default `30`)
    /// - `PAYGATE_TOKEN_ISSUER`, `PAYGATE_TOKEN_AUDIENCE`, `PAYGATE_TOKEN_ALLOWED_ISSUERS`
    /// - `PAYGATE_TOKEN_RENEWAL_ENABLED` (default `true`)
    /// - `PAYGATE_SIGNING_KEY`
    /// - `PAYGATE_EAPI_BASE_URL`
    /// - `PAYGATE_PAYMENT_BACKEND_URL`
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = env_or("PAYGATE_SAPI_BIND_ADDR", "127.0.0.1:8401")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8401)));

        let token_issuer = env_or("PAYGATE_TOKEN_ISSUER", "payment-eapi");
        let token_allowed_issuers = std::env::var("PAYGATE_TOKEN_ALLOWED_ISSUERS")
            .map(|v| v.split(',').map(str::trim).map(str::to_string).collect())
            .unwrap_or_else(|_| vec![token_issuer.clone()]);

        Self {
            bind_addr,
            log_level: env_or("PAYGATE_LOG_LEVEL", "info"),
            token_clock_skew_seconds: env_parse("PAYGATE_TOKEN_CLOCK_SKEW_SECONDS", 30),
            token_issuer,
            token_audience: env_or("PAYGATE_TOKEN_AUDIENCE", "payment-sapi"),
            token_allowed_issuers,
            token_renewal_enabled: env_parse("PAYGATE_TOKEN_RENEWAL_ENABLED", true),
            signing_key: env_or("PAYGATE_SIGNING_KEY", "dev-only-insecure-signing-key").into_bytes(),
            eapi_base_url: env_or("PAYGATE_EAPI_BASE_URL", "http://127.0.0.1:8400"),
            payment_backend_url: env_or("PAYGATE_PAYMENT_BACKEND_URL", "http://127.0.0.1:9000"),
        }
    }
}
