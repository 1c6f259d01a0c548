//! Result accumulator.
//!
//! A spawned task that exclusively owns the job's result workbook.
//! Producers enqueue [`SaveTask`]s; each batch is appended under the
//! task's sheet, header first on an empty sheet, rows always after the
//! current last row. Batch failures are logged and skipped so one bad
//! batch never loses the rest of the job's results.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crawjud_core::events::SaveTask;

use crate::error::EngineError;

/// Default sheet for successful rows.
pub const SHEET_RESULTS: &str = "Resultados";
/// Sheet collecting rows that errored, with `MOTIVO_ERRO` attached.
pub const SHEET_ERRORS: &str = "Erros";

/// Handle to the running accumulator task.
pub struct ResultAccumulator {
    handle: JoinHandle<()>,
}

impl ResultAccumulator {
    /// Spawn the consumer loop. `workbook_path` must not be touched by
    /// anything else while the accumulator runs.
    pub fn spawn(mut rx: mpsc::Receiver<SaveTask>, workbook_path: PathBuf) -> Self {
        let handle = tokio::spawn(async move {
            // Drains to completion: recv() yields every buffered task
            // before returning None once all senders are gone.
            while let Some(task) = rx.recv().await {
                let path = workbook_path.clone();
                let result =
                    tokio::task::spawn_blocking(move || append_rows(&path, &task)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "failed to append result batch");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "result append task panicked");
                    }
                }
            }
        });
        Self { handle }
    }

    /// Wait for the queue to drain and the task to exit. Call only
    /// after every save sender has been dropped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "result accumulator task panicked");
        }
    }
}

/// Append one batch to the workbook, creating file and sheet on first
/// use. Blocking; run under `spawn_blocking`.
fn append_rows(path: &Path, task: &SaveTask) -> Result<(), EngineError> {
    if task.rows.is_empty() {
        return Ok(());
    }

    let mut book = if path.exists() {
        umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| EngineError::Spreadsheet(e.to_string()))?
    } else {
        let mut book = umya_spreadsheet::new_file();
        book.remove_sheet_by_name("Sheet1").ok();
        book
    };

    if book.get_sheet_by_name(&task.sheet_name).is_none() {
        book.new_sheet(&task.sheet_name)
            .map_err(|e| EngineError::Spreadsheet(e.to_string()))?;
    }
    let sheet = book
        .get_sheet_by_name_mut(&task.sheet_name)
        .ok_or_else(|| EngineError::Spreadsheet(format!("sheet {} vanished", task.sheet_name)))?;

    let mut next_row = sheet.get_highest_row() + 1;
    if next_row == 1 {
        for (col, header) in task.rows[0].columns().enumerate() {
            sheet
                .get_cell_mut(((col + 1) as u32, 1))
                .set_value(header);
        }
        next_row = 2;
    }

    for record in &task.rows {
        for (col, (_, value)) in record.iter().enumerate() {
            sheet
                .get_cell_mut(((col + 1) as u32, next_row))
                .set_value(value);
        }
        next_row += 1;
    }

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .map_err(|e| EngineError::Spreadsheet(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawjud_core::BotRecord;

    fn record(process: &str, extra: &str) -> BotRecord {
        BotRecord::from_pairs([("NUMERO_PROCESSO", process), ("RESULTADO", extra)])
    }

    fn sheet_rows(path: &Path, sheet: &str) -> Vec<Vec<String>> {
        let book = umya_spreadsheet::reader::xlsx::read(path).unwrap();
        let sheet = book.get_sheet_by_name(sheet).unwrap();
        let highest_row = sheet.get_highest_row();
        let highest_col = sheet.get_highest_column();
        (1..=highest_row)
            .map(|row| {
                (1..=highest_col)
                    .map(|col| sheet.get_value((col, row)))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn first_batch_writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.xlsx");
        let task = SaveTask::new(vec![record("0001", "ok"), record("0002", "ok")], SHEET_RESULTS);

        append_rows(&path, &task).unwrap();

        let rows = sheet_rows(&path, SHEET_RESULTS);
        assert_eq!(rows[0], vec!["NUMERO_PROCESSO", "RESULTADO"]);
        assert_eq!(rows[1], vec!["0001", "ok"]);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn disjoint_batches_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.xlsx");

        append_rows(&path, &SaveTask::single(record("0001", "a"), SHEET_RESULTS)).unwrap();
        append_rows(&path, &SaveTask::single(record("0002", "b"), SHEET_RESULTS)).unwrap();

        let rows = sheet_rows(&path, SHEET_RESULTS);
        assert_eq!(rows[1][0], "0001");
        assert_eq!(rows[2][0], "0002");
    }

    #[test]
    fn error_rows_land_on_their_own_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.xlsx");

        append_rows(&path, &SaveTask::single(record("0001", "ok"), SHEET_RESULTS)).unwrap();
        let mut failed = record("0002", "");
        failed.set_error_reason("Processo não encontrado!");
        append_rows(&path, &SaveTask::single(failed, SHEET_ERRORS)).unwrap();

        let errors = sheet_rows(&path, SHEET_ERRORS);
        assert!(errors[0].contains(&"MOTIVO_ERRO".to_string()));
        assert_eq!(errors[1][0], "0002");
        // The results sheet is untouched.
        assert_eq!(sheet_rows(&path, SHEET_RESULTS).len(), 2);
    }

    #[tokio::test]
    async fn consumer_drains_queue_before_join_returns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resultados.xlsx");
        let (tx, rx) = mpsc::channel(256);
        let accumulator = ResultAccumulator::spawn(rx, path.clone());

        for i in 1..=20 {
            tx.send(SaveTask::single(record(&format!("{i:04}"), "ok"), SHEET_RESULTS))
                .await
                .unwrap();
        }
        drop(tx);
        accumulator.join().await;

        let rows = sheet_rows(&path, SHEET_RESULTS);
        assert_eq!(rows.len(), 21);
        assert_eq!(rows[20][0], "0020");
    }
}
