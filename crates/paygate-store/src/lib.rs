//! PostgreSQL implementation of `paygate_core::RotationStore`.

mod error;
mod models;
mod postgres;

pub use postgres::PostgresRotationStore;
