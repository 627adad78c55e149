//! Scan progress reporting.
//!
//! A [`ScanProgress`] receives events synchronously, at phase boundaries from
//! the scanning task and per candidate from worker tasks. It must not block.
//! A panicking callback is caught and logged; the scan carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use uuid::Uuid;

/// Coarse scan phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Safety,
    Enumerate,
    Probe,
    Persist,
}

/// Final disposition of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Discovered,
    Updated,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started { scan_id: Uuid, roots: usize },
    Phase(ScanPhase),
    RootRejected { path: PathBuf, reason: String },
    /// Candidates left after skip-list and incremental filtering.
    Queued { total: usize },
    ProbeStarted { path: PathBuf },
    CandidateFinished { path: PathBuf, status: CandidateStatus },
    Finished {
        scan_id: Uuid,
        discovered: usize,
        updated: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Receives [`ScanEvent`]s.
pub trait ScanProgress: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

impl<F> ScanProgress for F
where
    F: Fn(&ScanEvent) + Send + Sync,
{
    fn on_event(&self, event: &ScanEvent) {
        self(event)
    }
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ScanProgress for NoProgress {
    fn on_event(&self, _event: &ScanEvent) {}
}

pub(crate) fn notify(progress: &dyn ScanProgress, event: &ScanEvent) {
    if catch_unwind(AssertUnwindSafe(|| progress.on_event(event))).is_err() {
        tracing::warn!(?event, "progress callback panicked; continuing");
    }
}
