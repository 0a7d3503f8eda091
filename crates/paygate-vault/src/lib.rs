//! Client for the external credential vault used by the payment
//! authentication gateway.
//!
//! The gateway never stores raw or hashed secrets itself; every credential
//! read and write passes through this crate, which adds retry, circuit
//! breaking, and read-path caching on top of the vault's own API.

pub mod cache;
pub mod client;
pub mod error;
pub mod model;
pub mod resilience;

pub use cache::TtlCache;
pub use client::{HttpVaultClient, VaultClient};
pub use error::VaultError;
pub use model::{ClientCredential, CredentialVersion, VersionStatus};
pub use resilience::{CircuitBreakerConfig, ResilientVaultClient, RetryConfig};
