//! The `sqlx::FromRow` shape of a rotation row, and conversions to/from
//! `paygate_core::RotationRecord`.
//!
//! `RotationState` is stored as `TEXT` rather than a Postgres enum type, so
//! the row carries it as a `String` and conversion goes through
//! `RotationState`'s `Display`/`FromStr` (`paygate-core::rotation`).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use paygate_core::{RotationError, RotationRecord, RotationState};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RotationRow {
    pub rotation_id: Uuid,
    pub client_id: String,
    pub state: String,
    pub old_version_id: String,
    pub new_version_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub transition_period_seconds: i64,
    pub reason: Option<String>,
    pub failure_reason: Option<String>,
    pub version: i64,
}

impl TryFrom<RotationRow> for RotationRecord {
    type Error = RotationError;

    fn try_from(row: RotationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            rotation_id: row.rotation_id,
            client_id: row.client_id,
            state: RotationState::from_str(&row.state)?,
            old_version_id: row.old_version_id,
            new_version_id: row.new_version_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            transition_period_seconds: row.transition_period_seconds,
            reason: row.reason,
            failure_reason: row.failure_reason,
            version: row.version,
        })
    }
}
