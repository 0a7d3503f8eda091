//! Credential rotation state machine and coordinator.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use paygate_vault::VaultClient;

use crate::cache::TokenCache;
use crate::error::RotationError;

/// States of a rotation record, in the only order transitions permit:
/// `INITIATED -> DUAL_ACTIVE -> OLD_DEPRECATED -> NEW_ACTIVE`, with
/// `FAILED` reachable from any non-terminal state. `NEW_ACTIVE` and
/// `FAILED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationState {
    Initiated,
    DualActive,
    OldDeprecated,
    NewActive,
    Failed,
}

impl RotationState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::NewActive | Self::Failed)
    }

    /// The allowed state-transition edges for rotation.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Initiated, Self::DualActive)
                | (Self::Initiated, Self::Failed)
                | (Self::DualActive, Self::OldDeprecated)
                | (Self::DualActive, Self::Failed)
                | (Self::OldDeprecated, Self::NewActive)
                | (Self::OldDeprecated, Self::Failed)
        )
    }
}

impl std::fmt::Display for RotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initiated => "INITIATED",
            Self::DualActive => "DUAL_ACTIVE",
            Self::OldDeprecated => "OLD_DEPRECATED",
            Self::NewActive => "NEW_ACTIVE",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RotationState {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(Self::Initiated),
            "DUAL_ACTIVE" => Ok(Self::DualActive),
            "OLD_DEPRECATED" => Ok(Self::OldDeprecated),
            "NEW_ACTIVE" => Ok(Self::NewActive),
            "FAILED" => Ok(Self::Failed),
            other => Err(RotationError::Store(format!("unknown rotation state: {other}"))),
        }
    }
}

/// A persisted rotation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRecord {
    pub rotation_id: Uuid,
    pub client_id: String,
    pub state: RotationState,
    pub old_version_id: String,
    pub new_version_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub transition_period_seconds: i64,
    pub reason: Option<String>,
    pub failure_reason: Option<String>,
    /// Optimistic-concurrency column.
    pub version: i64,
}

/// Persistence seam for rotation records, storage-agnostic
/// so `paygate-core` never depends on `sqlx` directly. `paygate-store`
/// provides the PostgreSQL implementation.
#[async_trait::async_trait]
pub trait RotationStore: Send + Sync {
    async fn create(&self, record: RotationRecord) -> Result<RotationRecord, RotationError>;

    async fn get(&self, rotation_id: Uuid) -> Result<RotationRecord, RotationError>;

    /// The single non-terminal record for a client, if any — at most one
    /// rotation may be in progress per clientId at a time.
    async fn find_non_terminal_for_client(
        &self,
        client_id: &str,
    ) -> Result<Option<RotationRecord>, RotationError>;

    /// Persist `record` if its `version` matches the stored row's version,
    /// then return the row with `version` incremented. Returns
    /// [`RotationError::ConcurrencyConflict`] on mismatch.
    async fn update(&self, record: RotationRecord) -> Result<RotationRecord, RotationError>;

    async fn list_for_client(&self, client_id: &str) -> Result<Vec<RotationRecord>, RotationError>;

    async fn list_active(&self) -> Result<Vec<RotationRecord>, RotationError>;
}

/// Strong random secret plus its salted hash: the raw value only ever
/// appears transiently, the hash at rest.
pub struct GeneratedSecret {
    pub raw_secret: String,
    pub hashed_secret: String,
    pub salt: String,
}

fn generate_secret() -> GeneratedSecret {
    let mut raw_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw_bytes);
    let raw_secret = hex::encode(raw_bytes);

    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);

    let hashed_secret = hash_secret(&raw_secret, &salt);

    GeneratedSecret { raw_secret, hashed_secret, salt }
}

/// Salted one-way hash used both to generate new credential versions and
/// to verify candidates in `AuthTranslator`.
#[must_use]
pub fn hash_secret(raw_secret: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(raw_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Tunables for the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct RotationConfig {
    pub default_transition_period_seconds: i64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { default_transition_period_seconds: 3600 }
    }
}

/// Drives the rotation state machine.
///
/// Generic over the vault client and the rotation store so production code
/// wires concrete types (`ResilientVaultClient<HttpVaultClient>`,
/// `PostgresRotationStore`) while tests substitute fakes.
pub struct RotationCoordinator<V, S> {
    vault: V,
    store: S,
    config: RotationConfig,
}

impl<V: VaultClient, S: RotationStore> RotationCoordinator<V, S> {
    pub fn new(vault: V, store: S, config: RotationConfig) -> Self {
        Self { vault, store, config }
    }

    /// Starts a rotation for a client. Returns the persisted record and
    /// the one-time raw secret — the only place it is ever surfaced.
    pub async fn initiate(
        &self,
        client_id: &str,
        reason: Option<String>,
        transition_period_seconds: Option<i64>,
        force: bool,
    ) -> Result<(RotationRecord, String), RotationError> {
        if !force {
            if self.store.find_non_terminal_for_client(client_id).await?.is_some() {
                return Err(RotationError::RotationInProgress);
            }
        }

        let active_versions = self.vault.get_active_credential_versions(client_id).await?;
        let old_version_id = active_versions
            .first()
            .map(|v| v.version_id.clone())
            .ok_or_else(|| RotationError::Store(format!("no active credential version for {client_id}")))?;

        let secret = generate_secret();
        let new_version = self
            .vault
            .store_new_credential_version(client_id, &secret.hashed_secret, &secret.salt)
            .await?;

        self.vault
            .configure_credential_transition(client_id, &old_version_id, Some(&new_version.version_id))
            .await?;

        let record = RotationRecord {
            rotation_id: Uuid::new_v4(),
            client_id: client_id.to_string(),
            state: RotationState::DualActive,
            old_version_id,
            new_version_id: new_version.version_id,
            started_at: Utc::now(),
            completed_at: None,
            transition_period_seconds: transition_period_seconds
                .unwrap_or(self.config.default_transition_period_seconds),
            reason,
            failure_reason: None,
            version: 0,
        };
        let persisted = self.store.create(record).await?;
        tracing::info!(
            client_id,
            rotation_id = %persisted.rotation_id,
            state = %persisted.state,
            "rotation notification"
        );
        Ok((persisted, secret.raw_secret))
    }

    /// Advances a rotation to the next state. Validates the transition,
    /// performs the associated vault mutation (idempotent), and persists
    /// under optimistic concurrency.
    pub async fn advance(
        &self,
        rotation_id: Uuid,
        target_state: RotationState,
        token_cache: &TokenCache,
    ) -> Result<RotationRecord, RotationError> {
        let record = self.store.get(rotation_id).await?;
        if !record.state.can_transition_to(target_state) {
            return Err(RotationError::InvalidStateTransition { from: record.state, to: target_state });
        }

        let mut updated = record.clone();
        match (record.state, target_state) {
            (RotationState::DualActive, RotationState::OldDeprecated) => {
                self.vault.disable_credential_version(&record.client_id, &record.old_version_id).await?;
                updated.state = RotationState::OldDeprecated;
            }
            (RotationState::OldDeprecated, RotationState::NewActive) => {
                self.vault.remove_credential_version(&record.client_id, &record.old_version_id).await?;
                updated.state = RotationState::NewActive;
                updated.completed_at = Some(Utc::now());
                token_cache.evict_by_prefix(&record.client_id);
            }
            _ => return Err(RotationError::InvalidStateTransition { from: record.state, to: target_state }),
        }

        let persisted = self.store.update(updated).await?;
        tracing::info!(
            client_id = %record.client_id,
            rotation_id = %persisted.rotation_id,
            state = %persisted.state,
            "rotation notification"
        );
        Ok(persisted)
    }

    /// Drives a rotation unconditionally through its remaining states to
    /// `NEW_ACTIVE`.
    pub async fn complete(
        &self,
        rotation_id: Uuid,
        token_cache: &TokenCache,
    ) -> Result<RotationRecord, RotationError> {
        let mut record = self.store.get(rotation_id).await?;
        if record.state == RotationState::DualActive {
            record = self.advance(rotation_id, RotationState::OldDeprecated, token_cache).await?;
        }
        if record.state == RotationState::OldDeprecated {
            record = self.advance(rotation_id, RotationState::NewActive, token_cache).await?;
        }
        if record.state != RotationState::NewActive {
            return Err(RotationError::InvalidStateTransition { from: record.state, to: RotationState::NewActive });
        }
        Ok(record)
    }

    /// Cancels an in-progress rotation, restoring the old credential as
    /// the sole active one.
    pub async fn cancel(&self, rotation_id: Uuid, reason: String) -> Result<RotationRecord, RotationError> {
        let record = self.store.get(rotation_id).await?;
        if record.state.is_terminal() {
            return Err(RotationError::InvalidStateTransition { from: record.state, to: RotationState::Failed });
        }

        match record.state {
            RotationState::Initiated => {
                self.vault.remove_credential_version(&record.client_id, &record.new_version_id).await?;
            }
            RotationState::DualActive => {
                self.vault.remove_credential_version(&record.client_id, &record.new_version_id).await?;
                self.vault
                    .configure_credential_transition(&record.client_id, &record.old_version_id, None)
                    .await?;
            }
            RotationState::OldDeprecated => {
                self.vault
                    .configure_credential_transition(&record.client_id, &record.old_version_id, None)
                    .await?;
                self.vault.remove_credential_version(&record.client_id, &record.new_version_id).await?;
            }
            RotationState::NewActive | RotationState::Failed => unreachable!("checked terminal above"),
        }

        let mut updated = record;
        updated.state = RotationState::Failed;
        updated.failure_reason = Some(reason);
        updated.completed_at = Some(Utc::now());
        self.store.update(updated).await
    }

    /// A plain passthrough to the store, not part of the state machine
    /// itself.
    pub async fn get(&self, rotation_id: Uuid) -> Result<RotationRecord, RotationError> {
        self.store.get(rotation_id).await
    }

    /// Lists every rotation ever started for a client.
    pub async fn list_for_client(&self, client_id: &str) -> Result<Vec<RotationRecord>, RotationError> {
        self.store.list_for_client(client_id).await
    }

    /// Lists every rotation currently in a non-terminal state.
    pub async fn list_active(&self) -> Result<Vec<RotationRecord>, RotationError> {
        self.store.list_active().await
    }

    /// Checks whether an in-progress rotation is ready to advance,
    /// invoked periodically by the background scheduler.
    ///
    /// Advancement from `OLD_DEPRECATED` to `NEW_ACTIVE` is driven by
    /// elapsed grace-window time rather than a live per-request usage
    /// counter (the conservative default recorded in `DESIGN.md`), leaving
    /// the counter itself exposed as a plain in-process metric for an
    /// operator to act on.
    pub async fn check_progress(
        &self,
        now: DateTime<Utc>,
        old_deprecated_grace_seconds: i64,
        token_cache: &TokenCache,
    ) -> Result<Vec<RotationRecord>, RotationError> {
        let active = self.store.list_active().await?;
        let mut advanced = Vec::new();
        for record in active {
            match record.state {
                RotationState::DualActive => {
                    let elapsed = (now - record.started_at).num_seconds();
                    if elapsed >= record.transition_period_seconds {
                        advanced.push(self.advance(record.rotation_id, RotationState::OldDeprecated, token_cache).await?);
                    }
                }
                RotationState::OldDeprecated => {
                    // completed_at is unset until NEW_ACTIVE; use started_at
                    // plus transition period plus grace window as the
                    // reconciliation clock for "unused for N minutes".
                    let deadline = record.started_at
                        + chrono::Duration::seconds(record.transition_period_seconds + old_deprecated_grace_seconds);
                    if now >= deadline {
                        advanced.push(self.advance(record.rotation_id, RotationState::NewActive, token_cache).await?);
                    }
                }
                _ => {}
            }
        }
        Ok(advanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_set_matches_spec() {
        assert!(RotationState::Initiated.can_transition_to(RotationState::DualActive));
        assert!(RotationState::Initiated.can_transition_to(RotationState::Failed));
        assert!(RotationState::DualActive.can_transition_to(RotationState::OldDeprecated));
        assert!(RotationState::DualActive.can_transition_to(RotationState::Failed));
        assert!(RotationState::OldDeprecated.can_transition_to(RotationState::NewActive));
        assert!(RotationState::OldDeprecated.can_transition_to(RotationState::Failed));
        assert!(!RotationState::Initiated.can_transition_to(RotationState::NewActive));
        assert!(!RotationState::Initiated.can_transition_to(RotationState::OldDeprecated));
        assert!(!RotationState::DualActive.can_transition_to(RotationState::NewActive));
        assert!(!RotationState::NewActive.can_transition_to(RotationState::DualActive));
        assert!(!RotationState::Failed.can_transition_to(RotationState::DualActive));
    }

    #[test]
    fn terminal_states() {
        assert!(RotationState::NewActive.is_terminal());
        assert!(RotationState::Failed.is_terminal());
        assert!(!RotationState::Initiated.is_terminal());
        assert!(!RotationState::DualActive.is_terminal());
        assert!(!RotationState::OldDeprecated.is_terminal());
    }

    #[test]
    fn hash_is_deterministic_for_same_salt() {
        let a = hash_secret("s3cr3t", "salt1");
        let b = hash_secret("s3cr3t", "salt1");
        assert_eq!(a, b);
        let c = hash_secret("s3cr3t", "salt2");
        assert_ne!(a, c);
    }

    #[test]
    fn display_and_from_str_round_trip() {
        for state in [
            RotationState::Initiated,
            RotationState::DualActive,
            RotationState::OldDeprecated,
            RotationState::NewActive,
            RotationState::Failed,
        ] {
            let s = state.to_string();
            let parsed: RotationState = s.parse().unwrap();
            assert_eq!(parsed, state);
        }
    }
}
