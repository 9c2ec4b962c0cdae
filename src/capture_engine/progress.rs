//! Progress reporting abstraction for capture runs
//!
//! The orchestrator, lanes and retry controller report lifecycle events
//! through `ProgressReporter`; the binary plugs in a counting reporter that
//! logs running totals, tests and library callers can use `NoOpProgress`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::info;

/// Receives capture lifecycle events. Called concurrently from every lane.
pub trait ProgressReporter: Send + Sync {
    fn report_iteration_started(&self, iteration: usize, batch: usize, missing: usize);

    fn report_lane_started(&self, lane: usize, items: usize);

    /// One capture attempt is about to start (permit already held)
    fn report_attempt(&self, id: i64, attempt: u32);

    fn report_captured(&self, id: i64, artifact: &Path);

    /// Artifact already existed, nothing was navigated
    fn report_skipped(&self, id: i64);

    fn report_failed(&self, id: i64, error: &str);

    fn report_quarantined(&self, id: i64);

    fn report_iteration_completed(&self, iteration: usize, produced: usize);
}

/// Progress reporter that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report_iteration_started(&self, _iteration: usize, _batch: usize, _missing: usize) {}

    #[inline(always)]
    fn report_lane_started(&self, _lane: usize, _items: usize) {}

    #[inline(always)]
    fn report_attempt(&self, _id: i64, _attempt: u32) {}

    #[inline(always)]
    fn report_captured(&self, _id: i64, _artifact: &Path) {}

    #[inline(always)]
    fn report_skipped(&self, _id: i64) {}

    #[inline(always)]
    fn report_failed(&self, _id: i64, _error: &str) {}

    #[inline(always)]
    fn report_quarantined(&self, _id: i64) {}

    #[inline(always)]
    fn report_iteration_completed(&self, _iteration: usize, _produced: usize) {}
}

/// Point-in-time copy of the running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub attempts: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub quarantined: usize,
}

/// Keeps running counters and logs them every `log_every` finished items
#[derive(Debug)]
pub struct CounterProgress {
    attempts: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    quarantined: AtomicUsize,
    log_every: usize,
}

impl Default for CounterProgress {
    fn default() -> Self {
        Self::new(25)
    }
}

impl CounterProgress {
    #[must_use]
    pub fn new(log_every: usize) -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            quarantined: AtomicUsize::new(0),
            log_every: log_every.max(1),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
        }
    }

    fn maybe_log(&self) {
        let s = self.snapshot();
        let finished = s.succeeded + s.failed;
        if finished > 0 && finished % self.log_every == 0 {
            info!(
                "Progress: {} succeeded, {} failed, {} skipped ({} attempts)",
                s.succeeded, s.failed, s.skipped, s.attempts
            );
        }
    }
}

impl ProgressReporter for CounterProgress {
    fn report_iteration_started(&self, iteration: usize, batch: usize, missing: usize) {
        info!("Iteration {iteration}: dispatching {batch} of {missing} missing items");
    }

    fn report_lane_started(&self, lane: usize, items: usize) {
        log::debug!("Lane {lane} starting with {items} items");
    }

    fn report_attempt(&self, _id: i64, _attempt: u32) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn report_captured(&self, _id: i64, _artifact: &Path) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.maybe_log();
    }

    fn report_skipped(&self, _id: i64) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn report_failed(&self, id: i64, error: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        log::warn!("Item {id} failed: {error}");
        self.maybe_log();
    }

    fn report_quarantined(&self, _id: i64) {
        self.quarantined.fetch_add(1, Ordering::Relaxed);
    }

    fn report_iteration_completed(&self, iteration: usize, produced: usize) {
        let s = self.snapshot();
        info!(
            "Iteration {iteration} complete: {produced} new artifacts (totals: {} ok, {} failed, {} quarantined)",
            s.succeeded, s.failed, s.quarantined
        );
    }
}
