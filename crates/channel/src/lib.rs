//! Real-time progress channel for running jobs.
//!
//! Every job owns one [`ProgressChannel`]: a consumer task that drains
//! a bounded queue of [`LogEvent`]s, applies counters, appends to the
//! job's local log file, and relays each event to the log server's
//! room over WebSocket. If the server is unreachable the channel runs
//! in local-only mode; progress is never lost, only unbroadcast.

pub mod client;
pub mod progress;

pub use client::{LogServerClient, LogServerConnection};
pub use progress::{format_log_line, ChannelConfig, ProgressChannel, ProgressSender};

/// Errors raised while operating the progress channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("log file error: {0}")]
    LogFile(#[from] std::io::Error),
}
