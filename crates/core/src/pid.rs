//! Job process identifier.
//!
//! The `pid` correlates one job execution across the storage path, the
//! per-job log file, the save spreadsheet, and the real-time room name.

use serde::{Deserialize, Serialize};

/// Short alphanumeric process id, globally unique per run.
///
/// Stored uppercased. [`Pid::short`] yields the 6-character prefix used
/// for the log file and result archive names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(String);

impl Pid {
    /// Generate a fresh pid from a UUID v4, uppercased hex.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string().to_uppercase())
    }

    /// Wrap an externally supplied id (e.g. a broker task id).
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into().to_uppercase())
    }

    /// Full identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 6-character prefix used in file names ("mini pid").
    pub fn short(&self) -> &str {
        let end = self.0.len().min(6);
        &self.0[..end]
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
