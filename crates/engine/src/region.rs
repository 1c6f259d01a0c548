//! Region-partitioned execution for sharded portals.
//!
//! Rows are grouped by the court region embedded in their CNJ process
//! number; each region gets its own authenticated HTTP session and the
//! regions run with bounded concurrency. Progress events carry the
//! row's position in the original spreadsheet, so reporting reads the
//! same as the sequential engine.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crawjud_channel::ProgressSender;
use crawjud_core::events::SaveTask;
use crawjud_core::record::COL_PROOF_FILE;
use crawjud_core::region::{RegionPartition, COL_PROCESS_NUMBER};
use crawjud_core::BotRecord;

use crate::context::JobContext;
use crate::error::EngineError;
use crate::rows::{fail_row, send_save, stage_proof};
use crate::traits::{Located, RegionPortal, RegionSession};

/// Regions driven at the same time.
const REGION_CONCURRENCY: usize = 2;

/// Partition `records` by region and run the per-row protocol in each.
pub async fn run_regions(
    portal: &dyn RegionPortal,
    records: &[BotRecord],
    progress: &ProgressSender,
    save_tx: &mpsc::Sender<SaveTask>,
    cancel: &CancellationToken,
    ctx: &JobContext,
) {
    let partition = RegionPartition::from_records(records);

    // Rows the partition rejected still need a terminal event, or the
    // job's counters would never close.
    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u64;
        let valid = record
            .get(COL_PROCESS_NUMBER)
            .is_some_and(|raw| crawjud_core::region::ProcessNumber::parse(raw).is_ok());
        if !valid {
            fail_row(
                record,
                row,
                "Número de processo inválido".to_string(),
                progress,
                save_tx,
            )
            .await;
        }
    }

    let (regions, positions) = partition.into_regions();
    let positions = std::sync::Arc::new(positions);

    futures::stream::iter(regions.into_iter().map(|(region, rows)| {
        let progress = progress.clone();
        let save_tx = save_tx.clone();
        let cancel = cancel.clone();
        let positions = std::sync::Arc::clone(&positions);
        async move {
            run_region(portal, &region, rows, &progress, &save_tx, &cancel, &positions, ctx)
                .await;
        }
    }))
    .buffer_unordered(REGION_CONCURRENCY)
    .collect::<Vec<()>>()
    .await;
}

#[allow(clippy::too_many_arguments)]
async fn run_region(
    portal: &dyn RegionPortal,
    region: &str,
    rows: Vec<BotRecord>,
    progress: &ProgressSender,
    save_tx: &mpsc::Sender<SaveTask>,
    cancel: &CancellationToken,
    positions: &std::collections::HashMap<String, usize>,
    ctx: &JobContext,
) {
    let row_of = |record: &BotRecord| -> u64 {
        record
            .get(COL_PROCESS_NUMBER)
            .and_then(|p| positions.get(p))
            .map(|&pos| (pos + 1) as u64)
            .unwrap_or(0)
    };

    let mut session = match open_authenticated(portal, region).await {
        Ok(session) => session,
        Err(err) => {
            // The whole region is unreachable; fail its rows and let
            // the other regions keep going.
            tracing::error!(region, error = %err, "region session failed");
            for record in &rows {
                fail_row(record, row_of(record), err.to_string(), progress, save_tx).await;
            }
            return;
        }
    };

    for record in &rows {
        let row = row_of(record);

        if cancel.is_cancelled() {
            progress
                .info(row, "Execução interrompida pelo usuário")
                .await;
            break;
        }

        match execute_row(session.as_mut(), record).await {
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
                fail_row(record, row, err.to_string(), progress, save_tx).await;
            }
        }
    }
}

async fn open_authenticated(
    portal: &dyn RegionPortal,
    region: &str,
) -> Result<Box<dyn RegionSession>, EngineError> {
    let mut session = portal.open_region(region).await?;
    session.authenticate().await?;
    Ok(session)
}

async fn execute_row(
    session: &mut dyn RegionSession,
    record: &BotRecord,
) -> Result<crate::traits::RowOutput, EngineError> {
    match session.locate(record).await? {
        Located::Found => session.operate(record).await,
        Located::NotFound => Err(EngineError::NotFound),
    }
}
