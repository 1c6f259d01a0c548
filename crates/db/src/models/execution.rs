//! Execution entity models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StateId;
use super::{DbId, Timestamp};

/// A row from the `executions` table.
///
/// `parameters` holds the serialized task descriptor handed over by
/// the dispatch gateway; `pid` is assigned by the worker once the job
/// actually starts.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Execution {
    pub id: DbId,
    pub pid: Option<String>,
    pub state_id: StateId,
    pub bot_name: String,
    pub system: String,
    pub bot_type: String,
    pub user_name: String,
    pub parameters: serde_json::Value,
    pub total_rows: Option<i64>,
    pub success_count: Option<i64>,
    pub error_count: Option<i64>,
    /// Storage key of the result archive.
    pub file_output: Option<String>,
    /// Pre-signed download link for the result archive.
    pub url_output: Option<String>,
    pub error_message: Option<String>,
    pub worker_name: Option<String>,
    pub submitted_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub data_finalizacao: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a new pending execution.
#[derive(Debug, Deserialize)]
pub struct SubmitExecution {
    pub bot_name: String,
    pub system: String,
    pub bot_type: String,
    pub user_name: String,
    pub parameters: serde_json::Value,
}
