//! Per-row execution protocol for browser-driven portals.
//!
//! Every row ends in exactly one terminal event (success or error);
//! errors are scoped to their row. The stop token is honored at row
//! boundaries only, so a row in flight always completes or fails before
//! the job winds down.

use std::path::Path;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crawjud_channel::ProgressSender;
use crawjud_core::events::SaveTask;
use crawjud_core::record::COL_PROOF_FILE;
use crawjud_core::region::COL_PROCESS_NUMBER;
use crawjud_core::BotRecord;

use crate::accumulator::SHEET_ERRORS;
use crate::context::JobContext;
use crate::error::EngineError;
use crate::traits::{BrowserDriver, Located, Portal, RowOutput};

/// Drive the per-row protocol over `records`.
///
/// Never returns an error for row-scoped failures; those become error
/// events and `MOTIVO_ERRO` rows. Returns early only when the stop
/// token fires at a row boundary.
pub async fn run_rows(
    portal: &mut dyn Portal,
    driver: &mut dyn BrowserDriver,
    records: &[BotRecord],
    progress: &ProgressSender,
    save_tx: &mpsc::Sender<SaveTask>,
    cancel: &CancellationToken,
    ctx: &mut JobContext,
) {
    // Once a relaunch fails the browser is gone for good; remaining
    // rows are failed fast instead of hanging on a dead driver.
    let mut driver_dead = false;

    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u64;

        if cancel.is_cancelled() {
            progress
                .info(row, "Execução interrompida pelo usuário")
                .await;
            break;
        }

        if let Some(process) = record.get(COL_PROCESS_NUMBER) {
            if ctx.mark_seen(process.to_string()) {
                progress
                    .info(row, format!("Processo {process} repetido na planilha"))
                    .await;
            }
        }

        if driver_dead {
            fail_row(
                record,
                row,
                "Navegador indisponível".to_string(),
                progress,
                save_tx,
            )
            .await;
            continue;
        }

        match execute_row(portal, record).await {
            Ok(output) => {
                let mut rows_out = output.rows;
                if let Some(proof) = &output.proof_file {
                    if let Some(staged) = stage_proof(proof, ctx).await {
                        for saved in &mut rows_out {
                            saved.set(COL_PROOF_FILE, staged.clone());
                        }
                    }
                }
                send_save(save_tx, SaveTask::new(rows_out, output.sheet_name)).await;
                progress.success(row, "Processo salvo com sucesso").await;
            }
            Err(err) => {
                if driver.window_count().await == 0 {
                    driver_dead = !recover_driver(portal, driver, row, progress).await;
                }

                if !driver_dead {
                    let shot = ctx
                        .output_dir()
                        .join(format!("erro_{}_linha_{row}.png", ctx.pid().short()));
                    if let Err(e) = driver.screenshot(&shot).await {
                        tracing::debug!(row, error = %e, "screenshot unavailable");
                    }
                }

                fail_row(record, row, err.to_string(), progress, save_tx).await;
            }
        }
    }
}

/// Session check, locate, operate for one record.
async fn execute_row(
    portal: &mut dyn Portal,
    record: &BotRecord,
) -> Result<RowOutput, EngineError> {
    if portal.session_expired().await? {
        portal.authenticate().await?;
    }

    match portal.locate(record).await? {
        Located::Found => portal.operate(record).await,
        Located::NotFound => Err(EngineError::NotFound),
    }
}

/// One relaunch + re-auth attempt after a browser crash. Returns
/// whether the driver is usable again.
async fn recover_driver(
    portal: &mut dyn Portal,
    driver: &mut dyn BrowserDriver,
    row: u64,
    progress: &ProgressSender,
) -> bool {
    tracing::warn!(row, "browser died, relaunching");
    progress
        .info(row, "Navegador encerrado inesperadamente, reiniciando")
        .await;

    if let Err(e) = driver.relaunch().await {
        tracing::error!(row, error = %e, "browser relaunch failed");
        return false;
    }
    if let Err(e) = portal.authenticate().await {
        tracing::error!(row, error = %e, "re-authentication after relaunch failed");
        return false;
    }
    true
}

/// Move a proof artifact into the job output dir under a pid-bearing
/// name so the result archive picks it up. Returns the staged filename
/// recorded on the saved rows, or `None` when staging failed.
pub(crate) async fn stage_proof(proof: &Path, ctx: &JobContext) -> Option<String> {
    let name = proof.file_name()?.to_str()?;
    let staged = if name.contains(ctx.pid().short()) {
        name.to_string()
    } else {
        format!("{}_{name}", ctx.pid().short())
    };
    let target = ctx.output_dir().join(&staged);
    if proof != target.as_path() {
        if let Err(e) = tokio::fs::rename(proof, &target).await {
            tracing::warn!(proof = %proof.display(), error = %e, "could not stage proof file");
            return None;
        }
    }
    Some(staged)
}

/// Record a row failure: `MOTIVO_ERRO` column, error sheet, error event.
pub(crate) async fn fail_row(
    record: &BotRecord,
    row: u64,
    reason: String,
    progress: &ProgressSender,
    save_tx: &mpsc::Sender<SaveTask>,
) {
    let mut failed = record.clone();
    failed.set_error_reason(reason.clone());
    send_save(save_tx, SaveTask::single(failed, SHEET_ERRORS)).await;
    progress.error(row, reason).await;
}

pub(crate) async fn send_save(save_tx: &mpsc::Sender<SaveTask>, task: SaveTask) {
    if save_tx.send(task).await.is_err() {
        tracing::warn!("save task dropped: accumulator already stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use crawjud_channel::{ChannelConfig, ProgressChannel};
    use crawjud_core::{JobCounters, Pid};

    struct ScriptedPortal {
        /// Outcome per locate call: `Some(true)` found, `Some(false)`
        /// not found, `None` portal error.
        locate_script: Vec<Option<bool>>,
        locate_calls: usize,
        auth_calls: usize,
    }

    #[async_trait]
    impl Portal for ScriptedPortal {
        async fn authenticate(&mut self) -> Result<(), EngineError> {
            self.auth_calls += 1;
            Ok(())
        }

        async fn session_expired(&mut self) -> Result<bool, EngineError> {
            Ok(false)
        }

        async fn locate(&mut self, _record: &BotRecord) -> Result<Located, EngineError> {
            let outcome = self.locate_script[self.locate_calls];
            self.locate_calls += 1;
            match outcome {
                Some(true) => Ok(Located::Found),
                Some(false) => Ok(Located::NotFound),
                None => Err(EngineError::Row("portal fora do ar".into())),
            }
        }

        async fn operate(&mut self, record: &BotRecord) -> Result<RowOutput, EngineError> {
            Ok(RowOutput::new(vec![record.clone()], "Resultados"))
        }
    }

    struct ProofPortal {
        proof_dir: std::path::PathBuf,
    }

    #[async_trait]
    impl Portal for ProofPortal {
        async fn authenticate(&mut self) -> Result<(), EngineError> {
            Ok(())
        }

        async fn session_expired(&mut self) -> Result<bool, EngineError> {
            Ok(false)
        }

        async fn locate(&mut self, _record: &BotRecord) -> Result<Located, EngineError> {
            Ok(Located::Found)
        }

        async fn operate(&mut self, record: &BotRecord) -> Result<RowOutput, EngineError> {
            let proof = self.proof_dir.join("comprovante_intimacao.png");
            std::fs::write(&proof, b"png")?;
            Ok(RowOutput::new(vec![record.clone()], "Resultados").with_proof(proof))
        }
    }

    struct FakeDriver {
        windows: usize,
        relaunch_ok: bool,
        relaunches: usize,
    }

    #[async_trait]
    impl BrowserDriver for FakeDriver {
        async fn window_count(&mut self) -> usize {
            self.windows
        }

        async fn relaunch(&mut self) -> Result<(), EngineError> {
            self.relaunches += 1;
            if self.relaunch_ok {
                self.windows = 1;
                Ok(())
            } else {
                Err(EngineError::Driver("sem navegador".into()))
            }
        }

        async fn screenshot(&mut self, path: &std::path::Path) -> Result<(), EngineError> {
            std::fs::write(path, b"png")?;
            Ok(())
        }

        async fn quit(&mut self) {}
    }

    struct Harness {
        channel: ProgressChannel,
        progress: ProgressSender,
        save_rx: mpsc::Receiver<SaveTask>,
        save_tx: mpsc::Sender<SaveTask>,
        counters: Arc<JobCounters>,
        ctx: JobContext,
        _dir: tempfile::TempDir,
    }

    async fn harness(total: u64) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let counters = Arc::new(JobCounters::new());
        counters.set_total(total);
        let channel = ProgressChannel::start(
            &ChannelConfig {
                ws_url: None,
                log_dir: dir.path().to_path_buf(),
            },
            Pid::from_string("ROWTST"),
            Arc::clone(&counters),
            CancellationToken::new(),
            "01/01/2026 08:00:00".into(),
        )
        .await
        .unwrap();
        let progress = channel.sender();
        let (save_tx, save_rx) = mpsc::channel(256);
        let ctx = JobContext::new(Pid::from_string("ROWTST"), dir.path());
        Harness {
            channel,
            progress,
            save_rx,
            save_tx,
            counters,
            ctx,
            _dir: dir,
        }
    }

    fn records(n: usize) -> Vec<BotRecord> {
        (1..=n)
            .map(|i| {
                BotRecord::from_pairs([(COL_PROCESS_NUMBER, format!("080049{i}-37.2024.5.11.0001"))])
            })
            .collect()
    }

    async fn collect_saves(mut rx: mpsc::Receiver<SaveTask>) -> Vec<SaveTask> {
        let mut out = Vec::new();
        while let Ok(task) = rx.try_recv() {
            out.push(task);
        }
        out
    }

    #[tokio::test]
    async fn happy_path_every_row_succeeds() {
        let mut h = harness(3).await;
        let mut portal = ScriptedPortal {
            locate_script: vec![Some(true); 3],
            locate_calls: 0,
            auth_calls: 0,
        };
        let mut driver = FakeDriver {
            windows: 1,
            relaunch_ok: true,
            relaunches: 0,
        };

        run_rows(
            &mut portal,
            &mut driver,
            &records(3),
            &h.progress,
            &h.save_tx,
            &CancellationToken::new(),
            &mut h.ctx,
        )
        .await;

        drop(h.save_tx);
        drop(h.progress);
        let snapshot = h.channel.close().await;
        assert_eq!(snapshot.success, 3);
        assert_eq!(snapshot.error, 0);
        assert_eq!(snapshot.remaining, 0);

        let saves = collect_saves(h.save_rx).await;
        assert_eq!(saves.len(), 3);
        assert!(saves.iter().all(|t| t.sheet_name == "Resultados"));
    }

    #[tokio::test]
    async fn proof_files_are_staged_and_recorded_on_saved_rows() {
        let mut h = harness(1).await;
        let out_dir = h.ctx.output_dir().to_path_buf();
        let mut portal = ProofPortal {
            proof_dir: out_dir.clone(),
        };
        let mut driver = FakeDriver {
            windows: 1,
            relaunch_ok: true,
            relaunches: 0,
        };

        run_rows(
            &mut portal,
            &mut driver,
            &records(1),
            &h.progress,
            &h.save_tx,
            &CancellationToken::new(),
            &mut h.ctx,
        )
        .await;

        drop(h.save_tx);
        drop(h.progress);
        let snapshot = h.channel.close().await;
        assert_eq!(snapshot.success, 1);

        let saves = collect_saves(h.save_rx).await;
        let staged = saves[0].rows[0].get(COL_PROOF_FILE).unwrap();
        // Renamed to carry the pid, so the result archive includes it.
        assert_eq!(staged, "ROWTST_comprovante_intimacao.png");
        assert!(out_dir.join(staged).exists());
        assert!(!out_dir.join("comprovante_intimacao.png").exists());
    }

    #[tokio::test]
    async fn not_found_row_is_an_error_with_reason() {
        let mut h = harness(2).await;
        let mut portal = ScriptedPortal {
            locate_script: vec![Some(true), Some(false)],
            locate_calls: 0,
            auth_calls: 0,
        };
        let mut driver = FakeDriver {
            windows: 1,
            relaunch_ok: true,
            relaunches: 0,
        };

        run_rows(
            &mut portal,
            &mut driver,
            &records(2),
            &h.progress,
            &h.save_tx,
            &CancellationToken::new(),
            &mut h.ctx,
        )
        .await;

        drop(h.save_tx);
        drop(h.progress);
        let snapshot = h.channel.close().await;
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.error, 1);

        let saves = collect_saves(h.save_rx).await;
        let errors: Vec<_> = saves.iter().filter(|t| t.sheet_name == SHEET_ERRORS).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].rows[0].get("MOTIVO_ERRO"),
            Some("Processo não encontrado!")
        );
    }

    #[tokio::test]
    async fn driver_crash_gets_one_relaunch_then_continues() {
        let mut h = harness(3).await;
        let mut portal = ScriptedPortal {
            locate_script: vec![Some(true), None, Some(true)],
            locate_calls: 0,
            auth_calls: 0,
        };
        let mut driver = FakeDriver {
            windows: 0, // looks dead when row 2 errors
            relaunch_ok: true,
            relaunches: 0,
        };

        run_rows(
            &mut portal,
            &mut driver,
            &records(3),
            &h.progress,
            &h.save_tx,
            &CancellationToken::new(),
            &mut h.ctx,
        )
        .await;

        assert_eq!(driver.relaunches, 1);
        assert_eq!(portal.auth_calls, 1);

        drop(h.save_tx);
        drop(h.progress);
        let snapshot = h.channel.close().await;
        assert_eq!(snapshot.success, 2);
        assert_eq!(snapshot.error, 1);
        assert_eq!(snapshot.remaining, 0);
    }

    #[tokio::test]
    async fn failed_relaunch_fails_remaining_rows_without_hanging() {
        let mut h = harness(3).await;
        let mut portal = ScriptedPortal {
            locate_script: vec![None, Some(true), Some(true)],
            locate_calls: 0,
            auth_calls: 0,
        };
        let mut driver = FakeDriver {
            windows: 0,
            relaunch_ok: false,
            relaunches: 0,
        };

        run_rows(
            &mut portal,
            &mut driver,
            &records(3),
            &h.progress,
            &h.save_tx,
            &CancellationToken::new(),
            &mut h.ctx,
        )
        .await;

        drop(h.save_tx);
        drop(h.progress);
        let snapshot = h.channel.close().await;
        assert_eq!(snapshot.success, 0);
        assert_eq!(snapshot.error, 3);
        assert_eq!(snapshot.remaining, 0);
    }

    #[tokio::test]
    async fn stop_token_halts_at_row_boundary() {
        let mut h = harness(3).await;
        let mut portal = ScriptedPortal {
            locate_script: vec![Some(true); 3],
            locate_calls: 0,
            auth_calls: 0,
        };
        let mut driver = FakeDriver {
            windows: 1,
            relaunch_ok: true,
            relaunches: 0,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_rows(
            &mut portal,
            &mut driver,
            &records(3),
            &h.progress,
            &h.save_tx,
            &cancel,
            &mut h.ctx,
        )
        .await;

        assert_eq!(portal.locate_calls, 0);
        drop(h.save_tx);
        drop(h.progress);
        let snapshot = h.channel.close().await;
        assert_eq!(snapshot.success, 0);
        assert_eq!(snapshot.remaining, 3);
    }
}
