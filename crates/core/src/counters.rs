//! Per-job success/error/remaining counters.
//!
//! Single-writer discipline: only the progress event channel applies
//! events; everything else reads snapshots. `remaining` is initialized
//! to `total_rows` as soon as the total is known, then decremented
//! exactly once per terminal (success or error) event.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::events::LogKind;

/// Counter state shared between the progress channel (writer) and the
/// controller (reader). Invariant once the total is set:
/// `success + error + remaining == total_rows`.
#[derive(Debug, Default)]
pub struct JobCounters {
    total_rows: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,
    remaining: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total_rows: u64,
    pub success: u64,
    pub error: u64,
    pub remaining: u64,
}

impl JobCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the job's row total and initialize `remaining` to match.
    ///
    /// Idempotent: calling again with the same total is a no-op for
    /// counters already in motion.
    pub fn set_total(&self, total: u64) {
        if self.total_rows.swap(total, Ordering::SeqCst) == 0 {
            self.remaining.store(total, Ordering::SeqCst);
        }
    }

    /// Apply one event outcome. Log/Info events never touch counters;
    /// Success/Error each count exactly once.
    pub fn apply(&self, kind: LogKind) {
        match kind {
            LogKind::Success => {
                self.success.fetch_add(1, Ordering::SeqCst);
                self.decrement_remaining();
            }
            LogKind::Error => {
                self.error.fetch_add(1, Ordering::SeqCst);
                self.decrement_remaining();
            }
            LogKind::Log | LogKind::Info => {}
        }
    }

    fn decrement_remaining(&self) {
        // Saturating: a terminal event before set_total must not wrap.
        let _ = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1));
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_rows: self.total_rows.load(Ordering::SeqCst),
            success: self.success.load(Ordering::SeqCst),
            error: self.error.load(Ordering::SeqCst),
            remaining: self.remaining.load(Ordering::SeqCst),
        }
    }
}

impl CounterSnapshot {
    /// `success + error + remaining == total_rows`.
    pub fn is_consistent(&self) -> bool {
        self.success + self.error + self.remaining == self.total_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_total_initializes_remaining() {
        let counters = JobCounters::new();
        counters.set_total(5);
        let snap = counters.snapshot();
        assert_eq!(snap.remaining, 5);
        assert!(snap.is_consistent());
    }

    #[test]
    fn success_and_error_each_count_once() {
        let counters = JobCounters::new();
        counters.set_total(3);
        counters.apply(LogKind::Success);
        counters.apply(LogKind::Error);
        counters.apply(LogKind::Success);
        let snap = counters.snapshot();
        assert_eq!(snap.success, 2);
        assert_eq!(snap.error, 1);
        assert_eq!(snap.remaining, 0);
        assert!(snap.is_consistent());
    }

    #[test]
    fn log_and_info_never_touch_counters() {
        let counters = JobCounters::new();
        counters.set_total(2);
        counters.apply(LogKind::Log);
        counters.apply(LogKind::Info);
        let snap = counters.snapshot();
        assert_eq!(snap.success, 0);
        assert_eq!(snap.error, 0);
        assert_eq!(snap.remaining, 2);
    }

    #[test]
    fn invariant_holds_at_every_step() {
        let counters = JobCounters::new();
        counters.set_total(4);
        for kind in [LogKind::Log, LogKind::Success, LogKind::Info, LogKind::Error] {
            counters.apply(kind);
            assert!(counters.snapshot().is_consistent());
        }
    }

    #[test]
    fn terminal_event_before_total_does_not_underflow() {
        let counters = JobCounters::new();
        counters.apply(LogKind::Error);
        assert_eq!(counters.snapshot().remaining, 0);
    }
}
