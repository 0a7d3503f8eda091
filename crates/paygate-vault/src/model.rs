//! Credential data model as surfaced by the vault.
//!
//! The vault itself is an opaque, external secret store —
//! these types describe what it hands back, not how it stores it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single credential version.
///
/// Mutated only by the `RotationCoordinator`, never directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionStatus {
    /// Authenticatable; the normal steady-state for a client's sole version.
    Active,
    /// Authenticatable during a rotation's transition window, alongside the
    /// new `Active` version.
    Deprecated,
    /// No longer authenticatable; retained until deleted.
    Disabled,
}

impl VersionStatus {
    /// Versions in this status are candidates for credential matching:
    /// any whose status is `Active` or `Deprecated`.
    #[must_use]
    pub fn is_authenticatable(self) -> bool {
        matches!(self, Self::Active | Self::Deprecated)
    }
}

/// One versioned secret under a client's credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialVersion {
    /// Opaque, unique within the owning `clientId`. Never reused.
    pub version_id: String,
    /// Salted one-way hash of the raw secret. The raw secret is never
    /// persisted or returned by the vault.
    pub hashed_secret: String,
    /// Per-version salt used to compute `hashed_secret`.
    pub salt: String,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
}

/// A client's full credential record as fetched from the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredential {
    pub client_id: String,
    pub versions: Vec<CredentialVersion>,
}

impl ClientCredential {
    /// Versions eligible to match an incoming secret (`ACTIVE` or
    /// `DEPRECATED`) — one version in steady state, two during a rotation.
    pub fn authenticatable_versions(&self) -> impl Iterator<Item = &CredentialVersion> {
        self.versions.iter().filter(|v| v.status.is_authenticatable())
    }

    /// The full set of version ids currently considered "active" for
    /// authentication — used by rotation round-trip checks.
    #[must_use]
    pub fn active_version_ids(&self) -> Vec<String> {
        self.authenticatable_versions()
            .map(|v| v.version_id.clone())
            .collect()
    }
}
