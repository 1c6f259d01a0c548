//! Result archive builder.
//!
//! Packs the job's output directory into `{PID6}.zip`: the result
//! spreadsheet, proof files, and screenshots — anything whose filename
//! carries the pid — while the local `.log` file stays out.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crawjud_core::Pid;

use crate::error::EngineError;

/// Build the archive inside `output_dir`. Returns the archive path.
/// Blocking; run under `spawn_blocking`.
pub fn archive_output_dir(output_dir: &Path, pid: &Pid) -> Result<PathBuf, EngineError> {
    let zip_name = format!("{}.zip", pid.short());
    let zip_path = output_dir.join(&zip_name);

    let file = File::create(&zip_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<PathBuf> = std::fs::read_dir(output_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let mut packed = 0usize;
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == zip_name || !should_archive(name, pid) {
            continue;
        }

        zip.start_file(name, options)
            .map_err(|e| EngineError::Archive(e.to_string()))?;
        let mut src = File::open(&path)?;
        let mut buf = Vec::new();
        src.read_to_end(&mut buf)?;
        zip.write_all(&buf)?;
        packed += 1;
    }

    zip.finish().map_err(|e| EngineError::Archive(e.to_string()))?;
    tracing::info!(archive = %zip_path.display(), files = packed, "result archive built");
    Ok(zip_path)
}

/// Archive membership rule: pid-bearing files only, never the log.
fn should_archive(name: &str, pid: &Pid) -> bool {
    if name.ends_with(".log") {
        return false;
    }
    name.contains(pid.short()) || name.contains(pid.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_in(zip_path: &Path) -> Vec<String> {
        let file = File::open(zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn packs_pid_files_and_excludes_log() {
        let dir = tempfile::tempdir().unwrap();
        let pid = Pid::from_string("CAFE01XY");

        std::fs::write(
            dir.path().join("Planilha Resultados - CAFE01XY.xlsx"),
            b"xlsx",
        )
        .unwrap();
        std::fs::write(dir.path().join("erro_CAFE01_linha_2.png"), b"png").unwrap();
        std::fs::write(dir.path().join("CAFE01.log"), b"log").unwrap();
        std::fs::write(dir.path().join("outro_arquivo.txt"), b"txt").unwrap();

        let zip_path = archive_output_dir(dir.path(), &pid).unwrap();
        assert_eq!(zip_path.file_name().unwrap(), "CAFE01.zip");

        let names = names_in(&zip_path);
        assert!(names.contains(&"Planilha Resultados - CAFE01XY.xlsx".to_string()));
        assert!(names.contains(&"erro_CAFE01_linha_2.png".to_string()));
        assert!(!names.iter().any(|n| n.ends_with(".log")));
        assert!(!names.contains(&"outro_arquivo.txt".to_string()));
    }

    #[test]
    fn archive_of_empty_dir_is_valid_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pid = Pid::from_string("VAZIO1");

        let zip_path = archive_output_dir(dir.path(), &pid).unwrap();
        assert!(names_in(&zip_path).is_empty());
    }
}
