//! Maps `sqlx::Error` onto `paygate_core::RotationError`.
//!
//! A plain function rather than a `From` impl: both `RotationError` and
//! `sqlx::Error` are foreign to this crate, so the orphan rule rules out a
//! blanket `From<sqlx::Error>` impl; call sites map explicitly instead.

use paygate_core::RotationError;

pub(crate) fn map_sqlx_error(rotation_id: impl std::fmt::Display, err: sqlx::Error) -> RotationError {
    match &err {
        sqlx::Error::RowNotFound => RotationError::RotationNotFound(rotation_id.to_string()),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            RotationError::Store(format!("unique violation: {db_err}"))
        }
        other => RotationError::Store(format!("database error: {other}")),
    }
}
