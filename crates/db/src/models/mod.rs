//! Row models for the executions schema.

pub mod execution;
pub mod status;

/// Database row ID type (BIGSERIAL).
pub type DbId = i64;

/// Timestamp type matching TIMESTAMPTZ columns.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
