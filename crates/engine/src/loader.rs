//! Job input loader.
//!
//! Fetches the job's bundle manifest from object storage, decodes the
//! input spreadsheet into normalized [`BotRecord`]s, and materializes
//! any auxiliary files into the job output directory.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, Xlsx};
use serde::Deserialize;

use crawjud_core::normalize::{format_datetime, format_float, format_text};
use crawjud_core::BotRecord;
use crawjud_storage::{ObjectStore, StorageError};

use crate::error::EngineError;

/// Bundle manifest stored at `<FOLDER>/<folder>.json`.
#[derive(Debug, Deserialize)]
pub struct BundleManifest {
    /// Input spreadsheet object name, relative to the bundle folder.
    pub xlsx: Option<String>,
    /// Auxiliary files the bot needs at runtime.
    #[serde(default)]
    pub otherfiles: Vec<String>,
}

/// Decoded job input.
#[derive(Debug)]
pub struct InputBundle {
    pub records: Vec<BotRecord>,
    /// Auxiliary files materialized into the job output dir.
    pub extra_files: Vec<PathBuf>,
}

/// Fetch and decode the bundle under `folder`.
///
/// A missing or manifest-less spreadsheet is a start error: the job
/// cannot run without rows.
pub async fn load_bundle(
    storage: &dyn ObjectStore,
    folder: &str,
    output_dir: &Path,
) -> Result<InputBundle, EngineError> {
    let prefix = folder.to_uppercase();
    let manifest_key = format!("{prefix}/{folder}.json");
    let manifest_bytes = storage.get_object(&manifest_key).await.map_err(|e| match e {
        StorageError::NotFound(_) => EngineError::MissingSpreadsheet(folder.to_string()),
        other => EngineError::Storage(other),
    })?;
    let manifest: BundleManifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| EngineError::Internal(format!("invalid bundle manifest: {e}")))?;

    let xlsx_name = manifest
        .xlsx
        .ok_or_else(|| EngineError::MissingSpreadsheet(folder.to_string()))?;
    let xlsx_bytes = storage
        .get_object(&format!("{prefix}/{xlsx_name}"))
        .await
        .map_err(|e| match e {
            StorageError::NotFound(_) => EngineError::MissingSpreadsheet(folder.to_string()),
            other => EngineError::Storage(other),
        })?;

    let records =
        tokio::task::spawn_blocking(move || decode_spreadsheet(&xlsx_bytes))
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))??;

    let mut extra_files = Vec::with_capacity(manifest.otherfiles.len());
    for name in &manifest.otherfiles {
        let bytes = storage.get_object(&format!("{prefix}/{name}")).await?;
        let path = output_dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        extra_files.push(path);
    }

    tracing::info!(
        folder,
        rows = records.len(),
        extra_files = extra_files.len(),
        "input bundle loaded"
    );

    Ok(InputBundle {
        records,
        extra_files,
    })
}

/// Decode an xlsx payload into normalized records: uppercase headers,
/// `dd/mm/yyyy` dates, comma-decimal floats, empty strings for blanks.
pub fn decode_spreadsheet(bytes: &[u8]) -> Result<Vec<BotRecord>, EngineError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| EngineError::Spreadsheet(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EngineError::Spreadsheet("workbook has no sheets".into()))?
        .map_err(|e| EngineError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_uppercase())
        .collect();

    // A column is float-typed if any of its cells has a fractional
    // part; integer-valued cells in such a column still render with
    // two decimals.
    let float_columns: Vec<bool> = (0..headers.len())
        .map(|col| {
            range
                .rows()
                .skip(1)
                .any(|row| matches!(row.get(col), Some(Data::Float(f)) if f.fract() != 0.0))
        })
        .collect();

    let mut records = Vec::new();
    for row in rows {
        let mut record = BotRecord::new();
        let mut has_value = false;
        for (col, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = row
                .get(col)
                .map(|cell| format_cell(cell, float_columns[col]))
                .unwrap_or_default();
            if !value.is_empty() {
                has_value = true;
            }
            record.set(header.clone(), value);
        }
        if has_value {
            records.push(record);
        }
    }

    Ok(records)
}

fn format_cell(cell: &Data, float_column: bool) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => format_text(s),
        Data::Float(f) => {
            if float_column {
                format_float(*f)
            } else {
                format!("{}", *f as i64)
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(format_datetime)
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => format_text(s),
        Data::Error(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_fixture() -> Vec<u8> {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut((1, 1)).set_value("numero_processo");
        sheet.get_cell_mut((2, 1)).set_value("valor_causa");
        sheet.get_cell_mut((3, 1)).set_value("observacao");

        sheet
            .get_cell_mut((1, 2))
            .set_value("0800490-37.2024.5.11.0001");
        sheet.get_cell_mut((2, 2)).set_value_number(1234.5);
        sheet.get_cell_mut((3, 2)).set_value("ok  ");

        sheet
            .get_cell_mut((1, 3))
            .set_value("0800491-37.2024.5.04.0001");
        sheet.get_cell_mut((2, 3)).set_value_number(10);
        sheet.get_cell_mut((3, 3)).set_value("nan");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entrada.xlsx");
        umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();
        std::fs::read(&path).unwrap()
    }

    #[test]
    fn decodes_and_normalizes_records() {
        let records = decode_spreadsheet(&build_fixture()).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.get("NUMERO_PROCESSO"), Some("0800490-37.2024.5.11.0001"));
        assert_eq!(first.get("VALOR_CAUSA"), Some("1234,50"));
        assert_eq!(first.get("OBSERVACAO"), Some("ok"));

        let second = &records[1];
        // Integer cell in a float column still renders with decimals.
        assert_eq!(second.get("VALOR_CAUSA"), Some("10,00"));
        assert_eq!(second.get("OBSERVACAO"), Some(""));
    }

    #[test]
    fn empty_workbook_yields_no_records() {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut((1, 1)).set_value("COLUNA");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vazia.xlsx");
        umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();

        let records = decode_spreadsheet(&std::fs::read(&path).unwrap()).unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn missing_manifest_is_a_start_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = crawjud_storage::LocalStore::new(dir.path());

        let err = load_bundle(&storage, "folder01", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingSpreadsheet(_)));
    }

    #[tokio::test]
    async fn loads_bundle_with_extra_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = crawjud_storage::LocalStore::new(dir.path());
        let out = tempfile::tempdir().unwrap();

        storage
            .put_object(
                "FOLDER01/folder01.json",
                br#"{"xlsx": "entrada.xlsx", "otherfiles": ["anexo.txt"]}"#.to_vec(),
            )
            .await
            .unwrap();
        storage
            .put_object("FOLDER01/entrada.xlsx", build_fixture())
            .await
            .unwrap();
        storage
            .put_object("FOLDER01/anexo.txt", b"anexo".to_vec())
            .await
            .unwrap();

        let bundle = load_bundle(&storage, "folder01", out.path()).await.unwrap();
        assert_eq!(bundle.records.len(), 2);
        assert_eq!(bundle.extra_files.len(), 1);
        assert!(out.path().join("anexo.txt").exists());
    }
}
