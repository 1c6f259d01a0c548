//! Job lifecycle controller.
//!
//! Owns one job from INIT to FINALIZE. Finalization order is an
//! invariant: browser released, summary events emitted, save queue
//! drained and accumulator joined BEFORE the archive is built, then
//! upload, download link, and channel close. A failed upload degrades
//! the job (no link) but never un-finishes it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crawjud_channel::{ChannelConfig, ProgressChannel, ProgressSender};
use crawjud_core::counters::CounterSnapshot;
use crawjud_core::events::SaveTask;
use crawjud_core::text::format_elapsed;
use crawjud_core::{JobCounters, Pid};
use crawjud_storage::ObjectStore;

use crate::accumulator::ResultAccumulator;
use crate::archive::archive_output_dir;
use crate::context::JobContext;
use crate::error::EngineError;
use crate::loader::load_bundle;
use crate::region::run_regions;
use crate::rows::run_rows;
use crate::traits::{BrowserDriver, Portal, RegionPortal};

const SAVE_QUEUE_CAPACITY: usize = 256;

/// Validity of the result download link.
const DOWNLOAD_LINK_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Everything a job needs besides its portal.
pub struct JobConfig {
    pub pid: Pid,
    /// Bundle folder in object storage.
    pub storage_folder: String,
    /// Local scratch dir; result workbook, proofs, log, and archive
    /// land here.
    pub output_dir: PathBuf,
    pub channel: ChannelConfig,
}

/// How the job talks to its portal.
pub enum RunMode {
    /// Browser-driven portal, rows strictly in order.
    Browser {
        portal: Box<dyn Portal>,
        driver: Box<dyn BrowserDriver>,
    },
    /// Region-sharded portal over HTTP sessions.
    Regions { portal: Box<dyn RegionPortal> },
}

/// Outcome of a finished job.
#[derive(Debug)]
pub struct JobSummary {
    pub pid: Pid,
    pub counters: CounterSnapshot,
    /// Storage key of the uploaded archive, if the upload succeeded.
    pub archive_key: Option<String>,
    pub download_url: Option<String>,
    pub elapsed_secs: u64,
    /// True when the job was stopped by request before the last row.
    pub cancelled: bool,
}

/// Run one job end to end.
///
/// `cancel` is shared: the progress channel cancels it on an inbound
/// stop request, and callers may cancel it for worker shutdown.
pub async fn run_job(
    config: JobConfig,
    mut mode: RunMode,
    storage: &dyn ObjectStore,
    cancel: CancellationToken,
) -> Result<JobSummary, EngineError> {
    let started = Instant::now();
    tokio::fs::create_dir_all(&config.output_dir).await?;

    // INIT: channel, accumulator, context.
    let counters = Arc::new(JobCounters::new());
    let start_time = Local::now().format("%d/%m/%Y %H:%M:%S").to_string();
    let channel = ProgressChannel::start(
        &config.channel,
        config.pid.clone(),
        Arc::clone(&counters),
        cancel.clone(),
        start_time,
    )
    .await?;
    let progress = channel.sender();

    let workbook_path = config
        .output_dir
        .join(format!("Planilha Resultados - {}.xlsx", config.pid));
    let (save_tx, save_rx) = mpsc::channel(SAVE_QUEUE_CAPACITY);
    let accumulator = ResultAccumulator::spawn(save_rx, workbook_path);
    let mut ctx = JobContext::new(config.pid.clone(), &config.output_dir);

    tracing::info!(pid = %config.pid, folder = %config.storage_folder, "job started");

    let phase = drive(
        &config, &mut mode, storage, &progress, &save_tx, &cancel, &mut ctx, &counters,
    )
    .await;

    // The browser is released first on every path.
    if let RunMode::Browser { driver, .. } = &mut mode {
        driver.quit().await;
    }

    if let Err(err) = phase {
        tracing::error!(pid = %config.pid, error = %err, "job aborted");
        progress.error(0, err.to_string()).await;
        drop(save_tx);
        accumulator.join().await;
        drop(progress);
        channel.close().await;
        return Err(err);
    }

    // FINALIZE: summary, drain, archive, upload, close.
    let snapshot = counters.snapshot();
    let elapsed_secs = started.elapsed().as_secs();
    progress
        .info(
            0,
            format!(
                "Fim da execução | Tempo de execução: {}",
                format_elapsed(elapsed_secs)
            ),
        )
        .await;
    progress
        .info(
            0,
            format!("Sucessos: {} | Erros: {}", snapshot.success, snapshot.error),
        )
        .await;

    drop(save_tx);
    accumulator.join().await;

    let output_dir = config.output_dir.clone();
    let pid = config.pid.clone();
    let archive = tokio::task::spawn_blocking(move || archive_output_dir(&output_dir, &pid))
        .await
        .map_err(|e| EngineError::Internal(e.to_string()))?;

    let (archive_key, download_url) = match archive {
        Ok(path) => upload_archive(storage, &config, &path, &progress).await,
        Err(e) => {
            tracing::error!(pid = %config.pid, error = %e, "result archive failed");
            (None, None)
        }
    };

    let cancelled = cancel.is_cancelled();
    drop(progress);
    let counters = channel.close().await;

    tracing::info!(
        pid = %config.pid,
        success = counters.success,
        error = counters.error,
        cancelled,
        "job finished"
    );

    Ok(JobSummary {
        pid: config.pid,
        counters,
        archive_key,
        download_url,
        elapsed_secs,
        cancelled,
    })
}

/// AUTH → LOAD → RUN. Any error out of here is fatal to the job.
#[allow(clippy::too_many_arguments)]
async fn drive(
    config: &JobConfig,
    mode: &mut RunMode,
    storage: &dyn ObjectStore,
    progress: &ProgressSender,
    save_tx: &mpsc::Sender<SaveTask>,
    cancel: &CancellationToken,
    ctx: &mut JobContext,
    counters: &JobCounters,
) -> Result<(), EngineError> {
    match mode {
        RunMode::Browser { portal, driver } => {
            portal.authenticate().await.map_err(|e| match e {
                auth @ EngineError::Auth(_) => auth,
                other => EngineError::Auth(other.to_string()),
            })?;
            progress.info(0, "Autenticado no portal").await;

            let bundle = load_bundle(storage, &config.storage_folder, &config.output_dir).await?;
            counters.set_total(bundle.records.len() as u64);
            progress
                .info(0, format!("Planilha carregada | {} linhas", bundle.records.len()))
                .await;

            run_rows(
                portal.as_mut(),
                driver.as_mut(),
                &bundle.records,
                progress,
                save_tx,
                cancel,
                ctx,
            )
            .await;
        }
        RunMode::Regions { portal } => {
            let bundle = load_bundle(storage, &config.storage_folder, &config.output_dir).await?;
            counters.set_total(bundle.records.len() as u64);
            progress
                .info(0, format!("Planilha carregada | {} linhas", bundle.records.len()))
                .await;

            run_regions(portal.as_ref(), &bundle.records, progress, save_tx, cancel, ctx).await;
        }
    }
    Ok(())
}

/// Upload the archive and mint the download link. Failures degrade:
/// the job still finishes, only without a link.
async fn upload_archive(
    storage: &dyn ObjectStore,
    config: &JobConfig,
    archive_path: &std::path::Path,
    progress: &ProgressSender,
) -> (Option<String>, Option<String>) {
    let file_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("resultado.zip");
    let key = format!("{}/{}", config.storage_folder.to_uppercase(), file_name);

    let bytes = match tokio::fs::read(archive_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(pid = %config.pid, error = %e, "could not read result archive");
            return (None, None);
        }
    };

    if let Err(e) = storage.put_object(&key, bytes).await {
        tracing::warn!(pid = %config.pid, error = %e, "result upload failed");
        return (None, None);
    }

    let url = match storage.presigned_get(&key, DOWNLOAD_LINK_TTL).await {
        Ok(url) => {
            progress
                .info(0, format!("Arquivo de resultados disponível: {url}"))
                .await;
            Some(url)
        }
        Err(e) => {
            tracing::warn!(pid = %config.pid, error = %e, "presigned link failed");
            None
        }
    };

    (Some(key), url)
}
