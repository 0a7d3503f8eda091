//! Errors returned by the vault client and its resilience layer.
//!
//! `VaultError` is the closed set of failure modes for the vault client:
//! control flow through it never uses exceptions, only this enum.

/// Errors from vault operations, after retry and circuit-breaker handling.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// A network or 5xx failure that retry/circuit-breaking could not recover from.
    #[error("transient vault I/O failure: {0}")]
    TransientIo(String),

    /// The vault rejected our mTLS identity or account.
    #[error("vault authentication failure: {0}")]
    AuthFailure(String),

    /// The requested credential or version does not exist.
    #[error("not found in vault: {0}")]
    NotFound(String),

    /// The vault rejected the write due to a conflicting state.
    #[error("vault conflict: {0}")]
    Conflict(String),

    /// The circuit breaker for this operation is open and no cached fallback
    /// is available.
    #[error("vault circuit open for operation '{0}'")]
    CircuitOpen(String),
}

impl VaultError {
    /// Whether this error should be retried by the resilience layer.
    ///
    /// Only transient I/O failures are retried; 4xx-shaped failures
    /// (`AuthFailure`, `NotFound`, `Conflict`) are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }
}
