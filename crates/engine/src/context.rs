//! Per-job execution context.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crawjud_core::Pid;

/// State scoped to a single running job: identity, output location,
/// and a deduplication cache. Nothing here outlives the job.
pub struct JobContext {
    pid: Pid,
    output_dir: PathBuf,
    seen: HashSet<String>,
}

impl JobContext {
    pub fn new(pid: Pid, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            output_dir: output_dir.into(),
            seen: HashSet::new(),
        }
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Record `key` as seen; returns `true` if it was already present.
    /// Used to flag repeated process numbers and skip re-downloading
    /// artifacts the job already fetched.
    pub fn mark_seen(&mut self, key: impl Into<String>) -> bool {
        !self.seen.insert(key.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_seen_flags_repeats_only() {
        let mut ctx = JobContext::new(Pid::from_string("AB12CD"), "/tmp/out");
        assert!(!ctx.mark_seen("0800490-37.2024.5.11.0001"));
        assert!(ctx.mark_seen("0800490-37.2024.5.11.0001"));
        assert!(!ctx.mark_seen("outro"));
    }
}
