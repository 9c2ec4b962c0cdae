//! Retry Controller
//!
//! Wraps single capture attempts with a bounded-attempt, fixed-delay policy.
//! Each attempt holds one limiter permit from navigation through
//! persistence. Retry exhaustion is recorded in the error log exactly once.

use std::collections::BTreeSet;
use std::time::Duration;

use log::{debug, warn};

use super::capture_types::{CaptureError, FailureKind, ItemOutcome};
use super::context::CaptureContext;
use super::worker::run_attempt;
use crate::browser_pool::CapturePage;
use crate::catalog::WorkItem;
use crate::config::CaptureConfig;
use crate::store::ErrorEntry;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again if attempts remain
    Retry,
    /// Record the failure now without further attempts
    Terminal,
    /// Abort the run
    Fatal,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// HTTP statuses that are not worth retrying (empty: retry everything)
    pub terminal_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::utils::DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(crate::utils::DEFAULT_RETRY_DELAY_MS),
            terminal_statuses: BTreeSet::new(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            max_attempts: config.max_attempts().max(1),
            delay: config.retry_delay(),
            terminal_statuses: config.terminal_statuses().iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn classify(&self, error: &CaptureError) -> RetryDecision {
        match FailureKind::classify(error) {
            FailureKind::Persistence => RetryDecision::Fatal,
            FailureKind::HttpStatus(status) if self.terminal_statuses.contains(&status) => {
                RetryDecision::Terminal
            }
            _ if matches!(error, CaptureError::LimiterClosed) => RetryDecision::Fatal,
            _ => RetryDecision::Retry,
        }
    }
}

/// Drive `item` through up to `max_attempts` capture attempts.
///
/// Per-item failures come back as `Ok(ItemOutcome::Failed)` after the error
/// log entry is written. `Err` is reserved for run-fatal conditions (store
/// I/O, closed limiter).
pub async fn capture_with_retry<P: CapturePage>(
    page: &mut P,
    item: &WorkItem,
    ctx: &CaptureContext,
) -> Result<ItemOutcome, CaptureError> {
    let policy = &ctx.retry_policy;
    let target_url = item.target_url(&ctx.base_url);
    let mut attempts = 0;

    let last_error = loop {
        attempts += 1;

        let permit = ctx.limiter.acquire().await?;
        ctx.reporter.report_attempt(item.id, attempts);
        let result = run_attempt(page, item, &target_url, ctx).await;
        drop(permit);

        let error = match result {
            Ok(trace) => {
                debug!(
                    "Captured item {} in {} attempt(s) via {:?}",
                    item.id, attempts, trace.visited
                );
                return Ok(ItemOutcome::Captured { attempts });
            }
            Err(error) => error,
        };

        match policy.classify(&error.source) {
            RetryDecision::Fatal => return Err(error.source),
            RetryDecision::Terminal => {
                debug!("Item {} failed with terminal error: {}", item.id, error);
                break error;
            }
            RetryDecision::Retry if attempts < policy.max_attempts => {
                debug!(
                    "Attempt {}/{} for item {} failed: {}",
                    attempts, policy.max_attempts, item.id, error
                );
                tokio::time::sleep(policy.delay).await;
            }
            RetryDecision::Retry => break error,
        }
    };

    let message = last_error.source.to_string();
    warn!(
        "Item {} failed after {} attempt(s) in state {}: {}",
        item.id, attempts, last_error.state, message
    );
    ctx.error_log
        .append(&ErrorEntry::new(item.id, &target_url, &message))
        .await?;

    Ok(ItemOutcome::Failed { attempts, message })
}
