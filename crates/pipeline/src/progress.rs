//! Run-wide completion counters shared by the orchestrator and `/stats`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::Serialize;

/// Lock-free progress counters.
#[derive(Debug, Default)]
pub struct Progress {
    done: AtomicUsize,
    incomplete: AtomicUsize,
    skipped: AtomicUsize,
    total: AtomicUsize,
    finished: AtomicBool,
}

/// Serializable copy of [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub done: usize,
    pub incomplete: usize,
    pub skipped: usize,
    pub total: usize,
    pub finished: bool,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the starting point once the catalog has been scanned.
    pub fn init(&self, total: usize, already_done: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(already_done, Ordering::Relaxed);
    }

    /// Count one newly finalized sample; returns the new done count.
    pub fn record_done(&self) -> usize {
        self.done.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_incomplete(&self) {
        self.incomplete.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            done: self.done.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
        }
    }
}
