//! Database access for execution bookkeeping.
//!
//! The `executions` table is both the audit record and the work queue:
//! the gateway inserts pending rows, workers claim them with
//! `FOR UPDATE SKIP LOCKED`, and the engine writes the final outcome
//! back when a job ends.

pub mod models;
pub mod repositories;

pub use models::execution::{Execution, SubmitExecution};
pub use models::status::{ExecutionState, StateId};
pub use repositories::ExecutionRepo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to Postgres with a small fixed pool.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}
