//! Main capture orchestration
//!
//! Repeats: compute the work set, dispatch one batch across the lanes, count
//! what the batch produced. Stops when nothing is missing, when an iteration
//! produced no new artifact (persistent failures), or when the total limit
//! is reached.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, error, info, warn};
use serde::Serialize;

use super::context::CaptureContext;
use super::lane::{LaneReport, run_lane};
use super::partitioner::partition;
use super::progress::{NoOpProgress, ProgressReporter};
use crate::anomaly::{AnomalyDetector, quarantine_artifact};
use crate::browser_pool::BrowserLauncher;
use crate::catalog::{WorkCatalog, WorkItem};
use crate::config::CaptureConfig;

/// Which items a run works on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Catalog items without an artifact
    Missing,
    /// Ids currently in the error log that still lack an artifact
    RetryErrors,
    /// Exactly these ids
    Ids(Vec<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The work set is empty
    NothingMissing,
    /// An iteration produced zero new artifacts
    Stuck,
    LimitReached,
    /// `force` runs make exactly one pass
    ForcedPassComplete,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NothingMissing => "nothing missing",
            Self::Stuck => "no progress in last iteration",
            Self::LimitReached => "limit reached",
            Self::ForcedPassComplete => "forced pass complete",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub iterations: usize,
    /// Items handed to the retry controller
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub quarantined: usize,
    /// New artifacts on disk at the end of the run
    pub produced: usize,
    /// Size of the work set when the run stopped
    pub remaining_missing: usize,
    pub reason: TerminationReason,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl RunSummary {
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.produced as f64 / secs
        } else {
            0.0
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

#[derive(Debug, Default)]
struct IterationTally {
    attempted: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    captured: Vec<i64>,
}

impl IterationTally {
    fn absorb(&mut self, report: LaneReport) {
        self.attempted += report.attempted;
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        self.skipped += report.skipped;
        self.captured.extend(report.captured_ids);
    }
}

/// How a work set learns which items already have an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// Keep every item (force)
    Ignore,
    /// List the artifact directory
    Scan,
    /// Check only the ids in the progress log. Sound once `prepare_state`
    /// has back-filled it from the directory.
    Logged,
}

pub struct Orchestrator<C: WorkCatalog, L: BrowserLauncher> {
    config: CaptureConfig,
    catalog: Arc<C>,
    launcher: Arc<L>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<C: WorkCatalog, L: BrowserLauncher> Orchestrator<C, L> {
    pub fn new(config: CaptureConfig, catalog: C, launcher: L) -> Self {
        Self {
            config,
            catalog: Arc::new(catalog),
            launcher: Arc::new(launcher),
            reporter: Arc::new(NoOpProgress),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn context(&self) -> CaptureContext {
        CaptureContext::from_config(&self.config, Arc::clone(&self.reporter))
    }

    /// Catalog items with no artifact (minus known-bad ids with skip-errors)
    pub async fn missing_set(&self) -> Result<Vec<WorkItem>> {
        let ctx = self.context();
        self.work_set(&RunMode::Missing, &ctx, Completion::Scan).await
    }

    /// Ids that currently have an artifact on disk
    async fn completed_ids(&self, ctx: &CaptureContext, completion: Completion) -> Result<BTreeSet<i64>> {
        match completion {
            Completion::Ignore => Ok(BTreeSet::new()),
            Completion::Scan => ctx.store.list_ids().await.context("Failed to list artifact store"),
            Completion::Logged => {
                let mut logged = ctx
                    .progress_log
                    .load()
                    .await
                    .context("Failed to read progress log")?;
                // Quarantine removes files without touching the log
                logged.retain(|id| ctx.store.exists(*id));
                Ok(logged)
            }
        }
    }

    /// Resolve the items for `mode`, deduplicated and in id order, minus the
    /// ones `completion` reports as done.
    async fn work_set(
        &self,
        mode: &RunMode,
        ctx: &CaptureContext,
        completion: Completion,
    ) -> Result<Vec<WorkItem>> {
        let mut items = match mode {
            RunMode::Missing => self
                .catalog
                .fetch_items()
                .await
                .context("Failed to read work catalog")?,
            RunMode::Ids(ids) => self
                .catalog
                .fetch_by_ids(ids)
                .await
                .context("Failed to read work catalog")?,
            RunMode::RetryErrors => self.error_items(ctx).await?,
        };

        items.sort_by_key(|item| item.id);
        items.dedup_by_key(|item| item.id);

        if completion != Completion::Ignore {
            let existing = self.completed_ids(ctx, completion).await?;
            items.retain(|item| !existing.contains(&item.id));
        }

        if self.config.skip_errors() && *mode != RunMode::RetryErrors {
            let known_bad = ctx
                .error_log
                .load_ids()
                .await
                .context("Failed to read error log")?;
            items.retain(|item| !known_bad.contains(&item.id));
        }

        Ok(items)
    }

    /// Items for the ids in the error log, from the catalog when it still
    /// knows them, otherwise rebuilt from the recorded URL
    async fn error_items(&self, ctx: &CaptureContext) -> Result<Vec<WorkItem>> {
        let entries = ctx
            .error_log
            .load()
            .await
            .context("Failed to read error log")?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = entries.keys().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let mut items: HashMap<i64, WorkItem> = self
            .catalog
            .fetch_by_ids(&ids)
            .await
            .context("Failed to read work catalog")?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        for (id, entry) in &entries {
            if items.contains_key(id) {
                continue;
            }
            match WorkItem::from_target_url(*id, &entry.target_url) {
                Some(item) => {
                    items.insert(*id, item);
                }
                None => warn!("Cannot resolve error log id {id} from '{}'", entry.target_url),
            }
        }

        Ok(items.into_values().collect())
    }

    /// Prepare the logs for a run: `force` clears progress, otherwise any
    /// artifact on disk missing from the progress log is back-filled.
    async fn prepare_state(&self, ctx: &CaptureContext) -> Result<()> {
        ctx.store
            .ensure_dir()
            .await
            .context("Failed to create artifact directory")?;

        if ctx.force {
            info!("Force mode: clearing progress log {}", ctx.progress_log.path().display());
            ctx.progress_log
                .clear()
                .await
                .context("Failed to clear progress log")?;
        } else {
            let on_disk = ctx.store.list_ids().await.context("Failed to list artifact store")?;
            ctx.progress_log
                .reconcile(&on_disk)
                .await
                .context("Failed to reconcile progress log")?;
        }
        Ok(())
    }

    /// Run until a termination condition holds.
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();
        let ctx = Arc::new(self.context());
        self.prepare_state(&ctx).await?;

        let detector = self
            .config
            .anomaly_check()
            .then(|| AnomalyDetector::new(self.config.anomaly_thresholds().clone()));

        let mut summary = RunSummary {
            iterations: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            quarantined: 0,
            produced: 0,
            remaining_missing: 0,
            reason: TerminationReason::NothingMissing,
            started_at,
            elapsed: Duration::ZERO,
        };
        let mut dispatched = 0usize;
        // Under force every selected item is captured once, whether or not
        // its artifact exists, so the pass tracks what it already dispatched.
        let mut forced_done: BTreeSet<i64> = BTreeSet::new();

        info!(
            "Starting capture run ({:?}): {} lanes, budget {}, batch {}",
            mode,
            self.config.pool_size(),
            ctx.limiter.budget(),
            self.config.batch_size()
        );

        loop {
            let completion = if ctx.force {
                Completion::Ignore
            } else {
                Completion::Logged
            };
            let mut work = self.work_set(&mode, &ctx, completion).await?;
            if ctx.force {
                work.retain(|item| !forced_done.contains(&item.id));
            }

            if work.is_empty() {
                summary.reason = if ctx.force {
                    TerminationReason::ForcedPassComplete
                } else {
                    TerminationReason::NothingMissing
                };
                break;
            }

            let remaining_budget = self
                .config
                .total_limit()
                .map_or(usize::MAX, |limit| limit.saturating_sub(dispatched));
            if remaining_budget == 0 {
                summary.reason = TerminationReason::LimitReached;
                break;
            }

            let missing = work.len();
            let take = self.config.batch_size().max(1).min(remaining_budget);
            let batch: Vec<WorkItem> = work.into_iter().take(take).collect();
            let batch_len = batch.len();
            let urls: HashMap<i64, String> = batch
                .iter()
                .map(|item| (item.id, item.target_url(&ctx.base_url)))
                .collect();
            if ctx.force {
                forced_done.extend(urls.keys().copied());
            }

            summary.iterations += 1;
            let iteration = summary.iterations;
            self.reporter.report_iteration_started(iteration, batch_len, missing);

            let tally = self.dispatch(batch, &ctx).await?;
            dispatched += batch_len;

            let quarantined = match &detector {
                Some(detector) => self.quarantine_pass(detector, &tally.captured, &urls, &ctx).await?,
                None => 0,
            };

            // Captured ids were written this iteration; quarantined ones are gone again
            let produced = tally
                .captured
                .iter()
                .filter(|id| ctx.store.exists(**id))
                .count();

            summary.attempted += tally.attempted;
            summary.succeeded += tally.succeeded;
            summary.failed += tally.failed;
            summary.skipped += tally.skipped;
            summary.quarantined += quarantined;
            summary.produced += produced;
            self.reporter.report_iteration_completed(iteration, produced);

            if produced == 0 && !ctx.force {
                warn!("Iteration {iteration} produced no new artifacts, stopping");
                summary.reason = TerminationReason::Stuck;
                break;
            }

            if self
                .config
                .total_limit()
                .is_some_and(|limit| dispatched >= limit)
            {
                summary.reason = TerminationReason::LimitReached;
                break;
            }

            let delay = self.config.iteration_delay();
            if !delay.is_zero() {
                debug!("Sleeping {delay:?} before next iteration");
                tokio::time::sleep(delay).await;
            }
        }

        summary.remaining_missing = if summary.reason == TerminationReason::NothingMissing {
            0
        } else {
            self.work_set(&mode, &ctx, Completion::Scan).await?.len()
        };
        summary.elapsed = start.elapsed();
        info!(
            "Capture run finished ({}): {} produced, {} failed, {} quarantined, {} still missing",
            summary.reason,
            summary.produced,
            summary.failed,
            summary.quarantined,
            summary.remaining_missing
        );
        Ok(summary)
    }

    /// Partition `batch` across lanes and wait for every lane.
    async fn dispatch(&self, batch: Vec<WorkItem>, ctx: &Arc<CaptureContext>) -> Result<IterationTally> {
        let lanes = partition(batch, self.config.pool_size());
        let mut tally = IterationTally::default();
        let mut active = FuturesUnordered::new();

        for (lane, items) in lanes.into_iter().enumerate() {
            let size = items.len();
            let handle = tokio::spawn(run_lane(
                lane,
                items,
                Arc::clone(&self.launcher),
                Arc::clone(ctx),
            ));
            active.push(async move { (lane, size, handle.await) });
        }

        let mut fatal = None;
        while let Some((lane, size, joined)) = active.next().await {
            match joined {
                Ok(Ok(report)) => tally.absorb(report),
                Ok(Err(e)) => {
                    error!("Lane {lane} aborted: {e}");
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    // A panicked lane loses its sub-batch, the other lanes continue
                    error!("Lane {lane} task failed: {e}");
                    tally.absorb(LaneReport::lost(lane, size));
                }
            }
        }

        match fatal {
            Some(e) => Err(anyhow::Error::new(e).context("Capture run aborted")),
            None => Ok(tally),
        }
    }

    async fn quarantine_pass(
        &self,
        detector: &AnomalyDetector,
        captured: &[i64],
        urls: &HashMap<i64, String>,
        ctx: &CaptureContext,
    ) -> Result<usize> {
        let mut quarantined = 0;

        for &id in captured {
            let Some(path) = ctx.store.existing_path(id) else {
                continue;
            };
            match detector.inspect(&path).await {
                Ok((true, stats)) => {
                    warn!("Item {id} looks like a bot challenge: {stats:?}");
                    let url = urls.get(&id).map_or("", String::as_str);
                    quarantine_artifact(&ctx.store, &ctx.error_log, id, &path, url)
                        .await
                        .context("Failed to quarantine artifact")?;
                    self.reporter.report_quarantined(id);
                    quarantined += 1;
                }
                Ok((false, _)) => {}
                Err(e) => debug!("Anomaly check skipped for item {id}: {e}"),
            }
        }

        Ok(quarantined)
    }
}
