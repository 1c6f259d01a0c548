//! WebSocket client for the log server.
//!
//! [`LogServerClient`] holds the connection configuration; calling
//! [`LogServerClient::connect`] yields a live [`LogServerConnection`]
//! already joined to the job's room.

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crawjud_core::events::WireMessage;
use crawjud_core::Pid;

use crate::ChannelError;

/// Configuration handle for the log server.
pub struct LogServerClient {
    ws_url: String,
}

/// A live WebSocket connection, joined to one job's room.
pub struct LogServerConnection {
    pub pid: Pid,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl LogServerClient {
    /// Create a client targeting `ws_url`, e.g. `ws://host:8000/logs`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect and join the room named after the job's pid. The join
    /// message is always the first frame on the wire.
    pub async fn connect(&self, pid: &Pid) -> Result<LogServerConnection, ChannelError> {
        let (mut ws_stream, _response) = connect_async(&self.ws_url).await.map_err(|e| {
            ChannelError::Connection(format!(
                "Failed to connect to log server at {}: {e}",
                self.ws_url
            ))
        })?;

        let join = serde_json::to_string(&WireMessage::join_room(pid))
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;
        ws_stream
            .send(Message::Text(join.into()))
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        tracing::info!(pid = %pid, "Joined log room at {}", self.ws_url);

        Ok(LogServerConnection {
            pid: pid.clone(),
            ws_stream,
        })
    }
}
