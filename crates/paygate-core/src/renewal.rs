//! The `RenewalClient` seam.
//!
//! SAPI calls back into EAPI to renew an expired-but-well-signed token.
//! The cycle this would otherwise create (EAPI depends on SAPI for
//! forwarding, SAPI depends on EAPI for renewal) is broken by keeping no
//! shared library type crossing the process boundary: only this trait,
//! plus a plain HTTP implementation that the `paygate-sapi` binary
//! constructs against EAPI's renewal endpoint.

use async_trait::async_trait;

/// Implemented once, over HTTP, by `paygate-sapi`'s binary against EAPI's
/// `/internal/v1/tokens/renew`-style renewal surface. `paygate-core` only
/// depends on the trait so the state machine and validator stay agnostic
/// to transport.
#[async_trait]
pub trait RenewalClient: Send + Sync {
    /// Returns `Some(new_token_string)` if EAPI re-verified the expired
    /// token's signature, confirmed the client is still credentialed, and
    /// minted a replacement. Returns `None` on any refusal — the caller
    /// surfaces `EXPIRED`, never an error.
    async fn renew(&self, expired_token_string: &str) -> Option<String>;
}
