//! Handlers for `/bot` routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crawjud_channel::LogServerClient;
use crawjud_core::text::format_string;
use crawjud_core::Pid;
use crawjud_db::models::execution::SubmitExecution;
use crawjud_db::repositories::ExecutionRepo;

use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// A file embedded in the launch request.
#[derive(Debug, Deserialize)]
pub struct BundleFile {
    pub name: String,
    /// Base64-encoded contents.
    pub content: String,
}

/// Body of `POST /bot/launch`.
#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    pub bot_name: String,
    pub system: String,
    pub bot_type: String,
    pub user: String,
    pub email: Option<String>,
    pub license_token: String,
    /// Input spreadsheet.
    pub xlsx: BundleFile,
    /// Auxiliary files the bot needs.
    #[serde(default)]
    pub otherfiles: Vec<BundleFile>,
}

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub execution_id: i64,
    pub storage_folder: String,
}

/// POST /bot/launch
///
/// Validates the license, uploads the input bundle, registers the
/// execution, and leaves it pending for the worker queue. The start
/// email never blocks or fails the request.
pub async fn launch(
    State(state): State<AppState>,
    Json(request): Json<LaunchRequest>,
) -> GatewayResult<impl IntoResponse> {
    state
        .credentials
        .authorize(&request.license_token, &request.system)
        .await?;

    let folder = storage_folder_name(&request.bot_name, &request.system);
    let prefix = folder.to_uppercase();

    let xlsx_bytes = decode_file(&request.xlsx)?;
    state
        .storage
        .put_object(&format!("{prefix}/{}", request.xlsx.name), xlsx_bytes)
        .await?;

    let mut otherfile_names = Vec::with_capacity(request.otherfiles.len());
    for file in &request.otherfiles {
        let bytes = decode_file(file)?;
        state
            .storage
            .put_object(&format!("{prefix}/{}", file.name), bytes)
            .await?;
        otherfile_names.push(file.name.clone());
    }

    let manifest = serde_json::json!({
        "xlsx": request.xlsx.name,
        "otherfiles": otherfile_names,
    });
    state
        .storage
        .put_object(
            &format!("{prefix}/{folder}.json"),
            serde_json::to_vec(&manifest)
                .map_err(|e| GatewayError::Internal(e.to_string()))?,
        )
        .await?;

    let execution = ExecutionRepo::submit(
        &state.pool,
        &SubmitExecution {
            bot_name: request.bot_name.clone(),
            system: request.system.clone(),
            bot_type: request.bot_type.clone(),
            user_name: request.user.clone(),
            parameters: serde_json::json!({
                "storage_folder": folder,
                "license_token": request.license_token,
            }),
        },
    )
    .await?;

    tracing::info!(
        execution_id = execution.id,
        bot_name = %request.bot_name,
        system = %request.system,
        folder = %folder,
        "bot launch registered"
    );

    if let (Some(notifier), Some(email)) = (state.notifier.clone(), request.email.clone()) {
        let bot_name = request.bot_name.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.job_started(&email, &bot_name).await {
                tracing::warn!(error = %e, "start notification email failed");
            }
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(LaunchResponse {
            execution_id: execution.id,
            storage_folder: folder,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct StopRequest {
    pub email: Option<String>,
}

/// POST /bot/{pid}/stop
///
/// Emits `stopbot` to the pid's log room; the running worker reacts at
/// its next row boundary. Accepted even when nobody is listening.
pub async fn stop(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    body: Option<Json<StopRequest>>,
) -> GatewayResult<impl IntoResponse> {
    let pid = Pid::from_string(pid);

    let Some(ws_url) = state.log_ws_url.clone() else {
        return Err(GatewayError::Internal("log server not configured".into()));
    };

    send_stop(&ws_url, &pid)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    tracing::info!(pid = %pid, "stop request emitted");

    let email = body.and_then(|Json(b)| b.email);
    if let (Some(notifier), Some(email)) = (state.notifier.clone(), email) {
        let pid = pid.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.job_stopped(&email, pid.as_str()).await {
                tracing::warn!(error = %e, "stop notification email failed");
            }
        });
    }

    Ok(StatusCode::ACCEPTED)
}

async fn send_stop(ws_url: &str, pid: &Pid) -> Result<(), crawjud_channel::ChannelError> {
    use futures::SinkExt;
    use tokio_tungstenite::tungstenite::Message;

    use crawjud_core::events::WireMessage;

    let mut connection = LogServerClient::new(ws_url).connect(pid).await?;
    let frame = serde_json::to_string(&WireMessage::stop_bot(pid))
        .map_err(|e| crawjud_channel::ChannelError::Protocol(e.to_string()))?;
    connection
        .ws_stream
        .send(Message::Text(frame.into()))
        .await
        .map_err(|e| crawjud_channel::ChannelError::Connection(e.to_string()))?;
    connection.ws_stream.close(None).await.ok();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Storage folder: sanitized bot identity plus a short random suffix.
fn storage_folder_name(bot_name: &str, system: &str) -> String {
    let slug = format_string(&format!("{bot_name}_{system}")).to_lowercase();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{slug}_{}", &suffix[..8])
}

fn decode_file(file: &BundleFile) -> GatewayResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(&file.content)
        .map_err(|e| GatewayError::BadRequest(format!("arquivo {} inválido: {e}", file.name)))
}
