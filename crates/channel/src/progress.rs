//! Progress event consumer loop.
//!
//! Drains the job's bounded event queue, applies counters, appends to
//! the local log file, and relays events to the log server room. The
//! queue is drained to completion: the loop only exits once every
//! producer handle has been dropped and all buffered events were
//! handled, so no progress event is ever silently discarded.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crawjud_core::counters::CounterSnapshot;
use crawjud_core::events::{ExecutionStatus, LogEvent, LogKind, LogPayload, WireMessage};
use crawjud_core::{JobCounters, Pid};

use crate::client::LogServerClient;
use crate::ChannelError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Queue depth before producers start blocking.
const QUEUE_CAPACITY: usize = 256;

/// Progress channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Log server WebSocket URL; `None` means local-only mode.
    pub ws_url: Option<String>,
    /// Directory the job's `.log` file is written to.
    pub log_dir: PathBuf,
}

impl ChannelConfig {
    /// Read the log server URL from `LOG_WS_URL` (optional).
    pub fn from_env(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            ws_url: std::env::var("LOG_WS_URL").ok(),
            log_dir: log_dir.into(),
        }
    }
}

/// Producer handle onto the progress queue. Cheap to clone; dropping
/// the last clone lets the consumer finish draining.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<LogEvent>,
}

impl ProgressSender {
    /// Enqueue one event, blocking if the queue is full. A send after
    /// the consumer is gone is logged and dropped.
    pub async fn send(&self, event: LogEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::warn!("progress event dropped: consumer already stopped");
        }
    }

    pub async fn log(&self, row: u64, message: impl Into<String>) {
        self.send(LogEvent::log(row, message)).await;
    }

    pub async fn info(&self, row: u64, message: impl Into<String>) {
        self.send(LogEvent::info(row, message)).await;
    }

    pub async fn success(&self, row: u64, message: impl Into<String>) {
        self.send(LogEvent::success(row, message)).await;
    }

    pub async fn error(&self, row: u64, message: impl Into<String>) {
        self.send(LogEvent::error(row, message)).await;
    }
}

/// One job's running progress channel.
pub struct ProgressChannel {
    sender: ProgressSender,
    counters: Arc<JobCounters>,
    handle: JoinHandle<CounterSnapshot>,
}

impl ProgressChannel {
    /// Open the log file, connect to the log server (degrading to
    /// local-only mode on failure), and spawn the consumer task.
    ///
    /// `cancel` is cancelled when the room receives a stop request for
    /// this job; the row engine checks it at row boundaries.
    pub async fn start(
        config: &ChannelConfig,
        pid: Pid,
        counters: Arc<JobCounters>,
        cancel: CancellationToken,
        start_time: String,
    ) -> Result<Self, ChannelError> {
        tokio::fs::create_dir_all(&config.log_dir).await?;
        let log_path = config.log_dir.join(format!("{}.log", pid.short()));
        let log_file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;

        let connection = match &config.ws_url {
            Some(url) => match LogServerClient::new(url).connect(&pid).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    tracing::warn!(pid = %pid, error = %e, "log server unreachable, running local-only");
                    None
                }
            },
            None => None,
        };

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run(
            rx,
            connection.map(|c| c.ws_stream),
            pid,
            Arc::clone(&counters),
            cancel,
            log_file,
            start_time,
        ));

        Ok(Self {
            sender: ProgressSender { tx },
            counters,
            handle,
        })
    }

    pub fn sender(&self) -> ProgressSender {
        self.sender.clone()
    }

    /// Drop the channel's own producer handle and wait for the drain
    /// to finish. Every other [`ProgressSender`] clone must already be
    /// dropped or this will wait on them.
    pub async fn close(self) -> CounterSnapshot {
        let Self {
            sender,
            counters,
            handle,
        } = self;
        drop(sender);
        match handle.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "progress consumer task panicked");
                counters.snapshot()
            }
        }
    }
}

/// Format one local log line: `[(PID6, kind, row, HH:MM:SS)> message]`.
pub fn format_log_line(pid: &Pid, kind: LogKind, row: u64, hour: &str, message: &str) -> String {
    format!("[({}, {}, {}, {})> {}]", pid.short(), kind.as_str(), row, hour, message)
}

// ---- consumer loop ----

async fn run(
    mut rx: mpsc::Receiver<LogEvent>,
    ws_stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    pid: Pid,
    counters: Arc<JobCounters>,
    cancel: CancellationToken,
    mut log_file: tokio::fs::File,
    start_time: String,
) -> CounterSnapshot {
    let (mut sink, mut source) = match ws_stream {
        Some(ws) => {
            let (sink, source) = ws.split();
            (Some(sink), Some(source))
        }
        None => (None, None),
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    handle_event(
                        event, &pid, &counters, &cancel, &mut log_file, &mut sink, &start_time,
                    )
                    .await;
                    if sink.is_none() {
                        source = None;
                    }
                }
                // All producers dropped and the queue is empty.
                None => break,
            },
            inbound = next_frame(&mut source) => match inbound {
                Some(Ok(Message::Text(text))) => handle_inbound(&text, &pid, &cancel),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(pid = %pid, ?frame, "log server closed the connection");
                    sink = None;
                    source = None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(pid = %pid, error = %e, "log server receive error, going local-only");
                    sink = None;
                    source = None;
                }
                None => {
                    sink = None;
                    source = None;
                }
            },
        }
    }

    if let Some(mut sink) = sink {
        let _ = sink.send(Message::Close(None)).await;
    }

    counters.snapshot()
}

async fn next_frame(
    source: &mut Option<WsSource>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match source {
        Some(source) => source.next().await,
        None => std::future::pending().await,
    }
}

/// Status the room sees on each payload. A job reads as finished once
/// every row reached a terminal event, or as soon as a stop request
/// cancelled it; a stopped job never closes its remaining rows, so
/// cancellation alone must flip the status.
fn payload_status(snapshot: &CounterSnapshot, cancelled: bool) -> ExecutionStatus {
    if (snapshot.total_rows > 0 && snapshot.remaining == 0) || cancelled {
        ExecutionStatus::Finished
    } else {
        ExecutionStatus::Running
    }
}

async fn handle_event(
    event: LogEvent,
    pid: &Pid,
    counters: &JobCounters,
    cancel: &CancellationToken,
    log_file: &mut tokio::fs::File,
    sink: &mut Option<WsSink>,
    start_time: &str,
) {
    counters.apply(event.kind);
    let snapshot = counters.snapshot();

    let hour = Local::now().format("%H:%M:%S").to_string();
    let line = format_log_line(pid, event.kind, event.row, &hour, &event.message);
    if let Err(e) = log_file.write_all(format!("{line}\n").as_bytes()).await {
        tracing::warn!(pid = %pid, error = %e, "failed to append to job log file");
    }

    let Some(ws) = sink.as_mut() else {
        return;
    };

    let status = payload_status(&snapshot, cancel.is_cancelled());

    let payload = LogPayload {
        pid: pid.clone(),
        row: event.row,
        kind: event.kind,
        message: event.message,
        status,
        total: snapshot.total_rows,
        success: snapshot.success,
        error: snapshot.error,
        remaining: snapshot.remaining,
        start_time: start_time.to_string(),
    };

    let frame = match serde_json::to_string(&WireMessage::log_execution(&payload)) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(pid = %pid, error = %e, "failed to encode log payload");
            return;
        }
    };

    if let Err(e) = ws.send(Message::Text(frame.into())).await {
        tracing::warn!(pid = %pid, error = %e, "log server send failed, going local-only");
        *sink = None;
    }
}

fn handle_inbound(text: &str, pid: &Pid, cancel: &CancellationToken) {
    let message: WireMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(pid = %pid, error = %e, raw_message = %text, "unparseable frame from log server");
            return;
        }
    };

    if message.stop_room() == Some(pid.as_str()) {
        tracing::info!(pid = %pid, "stop requested from log room");
        cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawjud_core::events::LogEvent;

    fn local_config(dir: &std::path::Path) -> ChannelConfig {
        ChannelConfig {
            ws_url: None,
            log_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn log_line_format() {
        let pid = Pid::from_string("CAFE0123");
        let line = format_log_line(&pid, LogKind::Success, 3, "12:00:01", "Processo salvo");
        assert_eq!(line, "[(CAFE01, success, 3, 12:00:01)> Processo salvo]");
    }

    #[tokio::test]
    async fn local_only_mode_counts_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let counters = Arc::new(JobCounters::new());
        counters.set_total(2);

        let channel = ProgressChannel::start(
            &local_config(dir.path()),
            Pid::from_string("AB12CD"),
            Arc::clone(&counters),
            CancellationToken::new(),
            "01/01/2026 08:00:00".into(),
        )
        .await
        .unwrap();

        let sender = channel.sender();
        sender.success(1, "linha um").await;
        sender.error(2, "linha dois").await;
        drop(sender);

        let snapshot = channel.close().await;
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.error, 1);
        assert_eq!(snapshot.remaining, 0);

        let contents = std::fs::read_to_string(dir.path().join("AB12CD.log")).unwrap();
        assert!(contents.contains("linha um"));
        assert!(contents.contains("linha dois"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn queue_is_drained_before_close_returns() {
        let dir = tempfile::tempdir().unwrap();
        let counters = Arc::new(JobCounters::new());
        counters.set_total(50);

        let channel = ProgressChannel::start(
            &local_config(dir.path()),
            Pid::from_string("DRAIN1"),
            Arc::clone(&counters),
            CancellationToken::new(),
            "01/01/2026 08:00:00".into(),
        )
        .await
        .unwrap();

        let sender = channel.sender();
        for row in 1..=50 {
            sender.send(LogEvent::success(row, format!("linha {row}"))).await;
        }
        drop(sender);

        let snapshot = channel.close().await;
        assert_eq!(snapshot.success, 50);

        let contents = std::fs::read_to_string(dir.path().join("DRAIN1.log")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 50);
        for (i, line) in lines.iter().enumerate() {
            assert!(
                line.ends_with(&format!("> linha {}]", i + 1)),
                "line {i} out of order: {line}"
            );
        }
    }

    #[test]
    fn stopped_jobs_report_finished_status() {
        let done = CounterSnapshot {
            total_rows: 10,
            success: 8,
            error: 2,
            remaining: 0,
        };
        assert_eq!(payload_status(&done, false), ExecutionStatus::Finished);

        let partial = CounterSnapshot {
            total_rows: 10,
            success: 3,
            error: 1,
            remaining: 6,
        };
        assert_eq!(payload_status(&partial, false), ExecutionStatus::Running);
        assert_eq!(payload_status(&partial, true), ExecutionStatus::Finished);
    }

    #[tokio::test]
    async fn unreachable_server_degrades_to_local_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig {
            ws_url: Some("ws://127.0.0.1:1/logs".into()),
            log_dir: dir.path().to_path_buf(),
        };
        let counters = Arc::new(JobCounters::new());
        counters.set_total(1);

        let channel = ProgressChannel::start(
            &config,
            Pid::from_string("DEGRAD"),
            Arc::clone(&counters),
            CancellationToken::new(),
            "01/01/2026 08:00:00".into(),
        )
        .await
        .unwrap();

        channel.sender().success(1, "ainda registrado").await;
        let snapshot = channel.close().await;
        assert_eq!(snapshot.success, 1);

        let contents = std::fs::read_to_string(dir.path().join("DEGRAD.log")).unwrap();
        assert!(contents.contains("ainda registrado"));
    }
}
