//! Queue and wire message types for the job lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pid::Pid;
use crate::record::BotRecord;

/// Severity / meaning of a progress event.
///
/// `Success` and `Error` are terminal row outcomes and drive counters;
/// `Log` and `Info` are purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Log,
    Info,
    Success,
    Error,
}

impl LogKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One progress event, as enqueued by the row execution engine.
///
/// Counter totals are attached later by the progress channel, which is
/// the single writer of counter state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// 1-based row this event refers to; 0 for job-level messages.
    pub row: u64,
    pub kind: LogKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(kind: LogKind, row: u64, message: impl Into<String>) -> Self {
        Self {
            row,
            kind,
            message: message.into(),
        }
    }

    pub fn log(row: u64, message: impl Into<String>) -> Self {
        Self::new(LogKind::Log, row, message)
    }

    pub fn info(row: u64, message: impl Into<String>) -> Self {
        Self::new(LogKind::Info, row, message)
    }

    pub fn success(row: u64, message: impl Into<String>) -> Self {
        Self::new(LogKind::Success, row, message)
    }

    pub fn error(row: u64, message: impl Into<String>) -> Self {
        Self::new(LogKind::Error, row, message)
    }
}

/// Job status as reported to clients and bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    #[serde(rename = "Em Execução")]
    Running,
    #[serde(rename = "Finalizado")]
    Finished,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Em Execução",
            Self::Finished => "Finalizado",
        }
    }
}

/// Full `log_execution` payload emitted to the job's room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub pid: Pid,
    pub row: u64,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    pub status: ExecutionStatus,
    pub total: u64,
    pub success: u64,
    pub error: u64,
    pub remaining: u64,
    pub start_time: String,
}

/// Envelope for messages on the real-time log channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub event: String,
    pub data: serde_json::Value,
}

impl WireMessage {
    pub const JOIN_ROOM: &'static str = "join_room";
    pub const LOG_EXECUTION: &'static str = "log_execution";
    pub const STOP_BOT: &'static str = "stopbot";

    pub fn join_room(pid: &Pid) -> Self {
        Self {
            event: Self::JOIN_ROOM.to_string(),
            data: serde_json::json!({ "room": pid }),
        }
    }

    pub fn log_execution(payload: &LogPayload) -> Self {
        Self {
            event: Self::LOG_EXECUTION.to_string(),
            data: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn stop_bot(pid: &Pid) -> Self {
        Self {
            event: Self::STOP_BOT.to_string(),
            data: serde_json::json!({ "room": pid }),
        }
    }

    /// Room a `stopbot` message addresses, if any.
    pub fn stop_room(&self) -> Option<&str> {
        if self.event != Self::STOP_BOT {
            return None;
        }
        self.data.get("room").and_then(|v| v.as_str())
    }
}

/// A batch of output rows destined for one sheet of the job's result
/// spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTask {
    pub rows: Vec<BotRecord>,
    pub sheet_name: String,
}

impl SaveTask {
    pub fn new(rows: Vec<BotRecord>, sheet_name: impl Into<String>) -> Self {
        Self {
            rows,
            sheet_name: sheet_name.into(),
        }
    }

    pub fn single(row: BotRecord, sheet_name: impl Into<String>) -> Self {
        Self::new(vec![row], sheet_name)
    }
}

/// Task descriptor handed from the dispatch gateway to the broker.
///
/// The broker's task id is distinct from the job `pid`, which the
/// worker derives once it starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub storage_folder: String,
    pub bot_name: String,
    pub system: String,
    pub bot_type: String,
    pub user: String,
    pub license_token: String,
    pub execution_id: i64,
}

/// Payload for start/stop notification emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobNotification {
    pub pid: Pid,
    pub bot_name: String,
    pub user: String,
    pub when: DateTime<Utc>,
}
