//! One lane: a browser session driving its sub-batch in order.

use std::sync::Arc;

use log::{debug, warn};

use super::capture_types::{CaptureError, ItemOutcome};
use super::context::CaptureContext;
use super::worker::process_item;
use crate::browser_pool::{BrowserLauncher, BrowserSession};
use crate::catalog::WorkItem;

/// Tally for one lane's sub-batch
#[derive(Debug, Clone, Default)]
pub struct LaneReport {
    pub lane: usize,
    /// Items handed to the retry controller
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items whose artifact already existed
    pub skipped: usize,
    /// Ids captured in this lane, in completion order
    pub captured_ids: Vec<i64>,
    /// The browser never came up; every item counts as failed
    pub launch_failed: bool,
}

impl LaneReport {
    fn new(lane: usize) -> Self {
        Self {
            lane,
            ..Self::default()
        }
    }

    /// Report for a lane whose whole sub-batch was lost
    #[must_use]
    pub fn lost(lane: usize, items: usize) -> Self {
        Self {
            lane,
            failed: items,
            launch_failed: true,
            ..Self::default()
        }
    }
}

/// Run `items` through one browser session.
///
/// A session that fails to launch degrades to every item counting as failed
/// for this iteration; nothing is written to the error log since no attempt
/// was made. `Err` is only returned for run-fatal store errors, after the
/// session has been closed.
pub async fn run_lane<L: BrowserLauncher>(
    lane: usize,
    items: Vec<WorkItem>,
    launcher: Arc<L>,
    ctx: Arc<CaptureContext>,
) -> Result<LaneReport, CaptureError> {
    ctx.reporter.report_lane_started(lane, items.len());

    let mut session = match launcher.launch(lane).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Lane {lane} failed to start its browser: {e}");
            let message = format!("lane {lane} unavailable: {e}");
            for item in &items {
                ctx.reporter.report_failed(item.id, &message);
            }
            return Ok(LaneReport::lost(lane, items.len()));
        }
    };

    let mut report = LaneReport::new(lane);

    for item in &items {
        let outcome = match process_item(session.page(), item, &ctx).await {
            Ok(outcome) => outcome,
            Err(fatal) => {
                session.close().await;
                return Err(fatal);
            }
        };

        match outcome {
            ItemOutcome::Captured { .. } => {
                report.attempted += 1;
                report.succeeded += 1;
                report.captured_ids.push(item.id);
                ctx.reporter.report_captured(item.id, &ctx.store.path_for(item.id));
            }
            ItemOutcome::AlreadyPresent => {
                report.skipped += 1;
                ctx.reporter.report_skipped(item.id);
            }
            ItemOutcome::Failed { message, .. } => {
                report.attempted += 1;
                report.failed += 1;
                ctx.reporter.report_failed(item.id, &message);
            }
        }
    }

    session.close().await;
    debug!(
        "Lane {} done: {} ok, {} failed, {} skipped",
        lane, report.succeeded, report.failed, report.skipped
    );
    Ok(report)
}
