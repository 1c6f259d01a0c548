//! Repository for the `executions` table.
//!
//! Uses `ExecutionState` for all state transitions. No magic numbers.

use sqlx::PgPool;

use crate::models::execution::{Execution, SubmitExecution};
use crate::models::status::ExecutionState;
use crate::models::DbId;

/// Column list for `executions` queries.
const COLUMNS: &str = "\
    id, pid, state_id, bot_name, system, bot_type, user_name, \
    parameters, total_rows, success_count, error_count, \
    file_output, url_output, error_message, worker_name, \
    submitted_at, claimed_at, started_at, data_finalizacao, \
    created_at, updated_at";

/// Provides CRUD operations for executions.
pub struct ExecutionRepo;

impl ExecutionRepo {
    /// Insert a new pending execution. Returns the inserted row.
    pub async fn submit(
        pool: &PgPool,
        input: &SubmitExecution,
    ) -> Result<Execution, sqlx::Error> {
        let query = format!(
            "INSERT INTO executions (state_id, bot_name, system, bot_type, user_name, parameters) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Execution>(&query)
            .bind(ExecutionState::Pending.id())
            .bind(&input.bot_name)
            .bind(&input.system)
            .bind(&input.bot_type)
            .bind(&input.user_name)
            .bind(&input.parameters)
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the next pending execution for a worker.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers never
    /// claim the same row.
    pub async fn claim_next(
        pool: &PgPool,
        worker_name: &str,
    ) -> Result<Option<Execution>, sqlx::Error> {
        let query = format!(
            "UPDATE executions \
             SET worker_name = $1, claimed_at = NOW(), state_id = $2 \
             WHERE id = ( \
                 SELECT id FROM executions \
                 WHERE state_id = $3 AND claimed_at IS NULL \
                 ORDER BY submitted_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Execution>(&query)
            .bind(worker_name)
            .bind(ExecutionState::Running.id())
            .bind(ExecutionState::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Record the worker-assigned pid and the actual start time.
    pub async fn mark_started(pool: &PgPool, id: DbId, pid: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE executions SET pid = $2, started_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(pid)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record the final outcome: row counts, result archive key, and
    /// download link. Sets `data_finalizacao`.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize(
        pool: &PgPool,
        id: DbId,
        total_rows: i64,
        success_count: i64,
        error_count: i64,
        file_output: Option<&str>,
        url_output: Option<&str>,
        cancelled: bool,
    ) -> Result<(), sqlx::Error> {
        let state = if cancelled {
            ExecutionState::Cancelled
        } else {
            ExecutionState::Finished
        };
        sqlx::query(
            "UPDATE executions \
             SET state_id = $2, total_rows = $3, success_count = $4, error_count = $5, \
                 file_output = $6, url_output = $7, data_finalizacao = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(state.id())
        .bind(total_rows)
        .bind(success_count)
        .bind(error_count)
        .bind(file_output)
        .bind(url_output)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark an execution failed before it could produce results.
    pub async fn fail(pool: &PgPool, id: DbId, message: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE executions \
             SET state_id = $2, error_message = $3, data_finalizacao = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(ExecutionState::Failed.id())
        .bind(message)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fetch a single execution by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Execution>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM executions WHERE id = $1");
        sqlx::query_as::<_, Execution>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
