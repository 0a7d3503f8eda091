//! `PostgresRotationStore`: the `sqlx`/PostgreSQL implementation of
//! `paygate_core::RotationStore`.
//!
//! Queries use parameterized `sqlx::query_as` with explicit `RETURNING *`.
//! Optimistic
//! concurrency is a `WHERE version = $n` clause on every update; a row
//! count of zero means a conflicting writer won the race, surfaced as
//! [`RotationError::ConcurrencyConflict`].

use async_trait::async_trait;
use paygate_core::{RotationError, RotationRecord, RotationStore};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::map_sqlx_error;
use crate::models::RotationRow;

/// Schema this store expects:
///
/// ```sql
/// CREATE TABLE rotations (
///     rotation_id               UUID PRIMARY KEY,
///     client_id                 TEXT NOT NULL,
///     state                     TEXT NOT NULL,
///     old_version_id            TEXT NOT NULL,
///     new_version_id            TEXT NOT NULL,
///     started_at                TIMESTAMPTZ NOT NULL,
///     completed_at              TIMESTAMPTZ,
///     transition_period_seconds BIGINT NOT NULL,
///     reason                    TEXT,
///     failure_reason            TEXT,
///     version                   BIGINT NOT NULL DEFAULT 0
/// );
/// CREATE INDEX rotations_client_state_idx ON rotations (client_id, state);
/// ```
pub struct PostgresRotationStore {
    pool: PgPool,
}

impl PostgresRotationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RotationStore for PostgresRotationStore {
    async fn create(&self, record: RotationRecord) -> Result<RotationRecord, RotationError> {
        let row = sqlx::query_as::<_, RotationRow>(
            r"INSERT INTO rotations
                (rotation_id, client_id, state, old_version_id, new_version_id,
                 started_at, completed_at, transition_period_seconds, reason,
                 failure_reason, version)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
              RETURNING *",
        )
        .bind(record.rotation_id)
        .bind(&record.client_id)
        .bind(record.state.to_string())
        .bind(&record.old_version_id)
        .bind(&record.new_version_id)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.transition_period_seconds)
        .bind(&record.reason)
        .bind(&record.failure_reason)
        .bind(record.version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(record.rotation_id, e))?;

        row.try_into()
    }

    async fn get(&self, rotation_id: Uuid) -> Result<RotationRecord, RotationError> {
        let row = sqlx::query_as::<_, RotationRow>("SELECT * FROM rotations WHERE rotation_id = $1")
            .bind(rotation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(rotation_id, e))?
            .ok_or_else(|| RotationError::RotationNotFound(rotation_id.to_string()))?;
        row.try_into()
    }

    async fn find_non_terminal_for_client(
        &self,
        client_id: &str,
    ) -> Result<Option<RotationRecord>, RotationError> {
        let row = sqlx::query_as::<_, RotationRow>(
            r"SELECT * FROM rotations
              WHERE client_id = $1 AND state NOT IN ('NEW_ACTIVE', 'FAILED')
              LIMIT 1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(client_id, e))?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, record: RotationRecord) -> Result<RotationRecord, RotationError> {
        let row = sqlx::query_as::<_, RotationRow>(
            r"UPDATE rotations
              SET state = $1,
                  old_version_id = $2,
                  new_version_id = $3,
                  completed_at = $4,
                  failure_reason = $5,
                  version = version + 1
              WHERE rotation_id = $6 AND version = $7
              RETURNING *",
        )
        .bind(record.state.to_string())
        .bind(&record.old_version_id)
        .bind(&record.new_version_id)
        .bind(record.completed_at)
        .bind(&record.failure_reason)
        .bind(record.rotation_id)
        .bind(record.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(record.rotation_id, e))?;

        match row {
            Some(row) => row.try_into(),
            None => Err(RotationError::ConcurrencyConflict(record.rotation_id.to_string())),
        }
    }

    async fn list_for_client(&self, client_id: &str) -> Result<Vec<RotationRecord>, RotationError> {
        let rows = sqlx::query_as::<_, RotationRow>(
            "SELECT * FROM rotations WHERE client_id = $1 ORDER BY started_at DESC",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(client_id, e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_active(&self) -> Result<Vec<RotationRecord>, RotationError> {
        let rows = sqlx::query_as::<_, RotationRow>(
            "SELECT * FROM rotations WHERE state NOT IN ('NEW_ACTIVE', 'FAILED')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active", e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
