//! Capture Worker
//!
//! Per-item state machine:
//!
//! ```text
//! Idle → Navigating → AwaitingContent → DismissingOverlays → Capturing
//!      → Postprocessing → Persisting → Done
//! ```
//!
//! `Failed` is reachable from navigation, content wait, capture and
//! persistence. Overlay dismissal and watermarking degrade silently.

use std::path::PathBuf;
use std::sync::Arc;

use std::time::Duration;

use log::{debug, trace};
use rand::Rng;

use super::capture_types::{AttemptError, AttemptTrace, CaptureError, CaptureState, ItemOutcome};
use super::content_validator::check_response;
use super::context::CaptureContext;
use super::page_timeout::with_page_timeout;
use super::retry::capture_with_retry;
use super::watermark::apply_watermark;
use crate::browser_pool::CapturePage;
use crate::catalog::WorkItem;

/// Process one item: skip it when its artifact already exists, otherwise
/// pause for a random interval and hand it to the retry controller.
///
/// The pause happens before any limiter permit is taken.
pub async fn process_item<P: CapturePage>(
    page: &mut P,
    item: &WorkItem,
    ctx: &CaptureContext,
) -> Result<ItemOutcome, CaptureError> {
    if !ctx.force && ctx.store.exists(item.id) {
        trace!("Artifact for item {} already present, skipping", item.id);
        return Ok(ItemOutcome::AlreadyPresent);
    }

    let pause = request_jitter(ctx.settings.request_delay);
    if !pause.is_zero() {
        trace!("Pausing {pause:?} before item {}", item.id);
        tokio::time::sleep(pause).await;
    }

    capture_with_retry(page, item, ctx).await
}

/// Uniform random duration in `min..=max`; `min` when the range is empty
#[must_use]
pub fn request_jitter((min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

/// Data carried between states
enum Step {
    Navigate,
    AwaitContent,
    DismissOverlays,
    Capture,
    Postprocess(Vec<u8>),
    Persist(Vec<u8>),
    Done(PathBuf),
}

impl Step {
    fn state(&self) -> CaptureState {
        match self {
            Self::Navigate => CaptureState::Navigating,
            Self::AwaitContent => CaptureState::AwaitingContent,
            Self::DismissOverlays => CaptureState::DismissingOverlays,
            Self::Capture => CaptureState::Capturing,
            Self::Postprocess(_) => CaptureState::Postprocessing,
            Self::Persist(_) => CaptureState::Persisting,
            Self::Done(_) => CaptureState::Done,
        }
    }
}

/// Run a single attempt for `item` against `page`.
///
/// The artifact is written only after a successful capture, so an attempt
/// that fails or is interrupted leaves nothing behind.
pub async fn run_attempt<P: CapturePage>(
    page: &mut P,
    item: &WorkItem,
    target_url: &str,
    ctx: &CaptureContext,
) -> Result<AttemptTrace, AttemptError> {
    let settings = &ctx.settings;
    let mut trace = AttemptTrace {
        visited: vec![CaptureState::Idle],
        ..AttemptTrace::default()
    };
    let mut step = Step::Navigate;

    loop {
        let state = step.state();
        trace.visited.push(state);
        let fail = |source: CaptureError| AttemptError::new(state, source);

        step = match step {
            Step::Navigate => {
                let status = with_page_timeout(
                    page.navigate(target_url),
                    settings.navigation_timeout,
                    "navigation",
                    target_url,
                )
                .await
                .map_err(fail)?;

                if let Some(status) = check_response(target_url, status).rejected_status() {
                    return Err(fail(CaptureError::HttpStatus { status }));
                }
                Step::AwaitContent
            }

            Step::AwaitContent => {
                let appeared = match tokio::time::timeout(
                    settings.content_wait_timeout,
                    page.wait_for_selector(&settings.content_selector, settings.content_wait_timeout),
                )
                .await
                {
                    Ok(result) => result.map_err(fail)?,
                    Err(_) => false,
                };

                if !appeared {
                    debug!(
                        "Content marker '{}' not found for item {}, waiting {:?}",
                        settings.content_selector, item.id, settings.fallback_wait
                    );
                    tokio::time::sleep(settings.fallback_wait).await;
                }
                trace.content_ready = appeared;
                Step::DismissOverlays
            }

            Step::DismissOverlays => {
                if let Err(e) = page.suppress_overlays(&settings.overlay_selectors).await {
                    debug!("Overlay cleanup failed for item {}: {}", item.id, e);
                }
                Step::Capture
            }

            Step::Capture => {
                let raw = with_page_timeout(
                    page.capture_full_page(settings.format, settings.jpeg_quality),
                    settings.navigation_timeout,
                    "screenshot",
                    target_url,
                )
                .await
                .map_err(fail)?;

                if raw.is_empty() {
                    return Err(fail(CaptureError::Capture("empty screenshot".to_string())));
                }
                Step::Postprocess(raw)
            }

            Step::Postprocess(raw) => {
                let (bytes, watermarked) = postprocess(raw, ctx, item.id).await;
                trace.watermarked = watermarked;
                Step::Persist(bytes)
            }

            Step::Persist(bytes) => {
                let path = ctx.store.write(item.id, bytes).await.map_err(|e| fail(e.into()))?;
                ctx.progress_log
                    .append(item.id)
                    .await
                    .map_err(|e| fail(e.into()))?;
                Step::Done(path)
            }

            Step::Done(path) => {
                trace.artifact = Some(path);
                return Ok(trace);
            }
        };
    }
}

/// Stamp the watermark off the async runtime. Any failure keeps the raw bytes.
async fn postprocess(raw: Vec<u8>, ctx: &CaptureContext, id: i64) -> (Vec<u8>, bool) {
    let Some(spec) = ctx.settings.watermark.clone() else {
        return (raw, false);
    };
    let format = ctx.settings.format;
    let quality = ctx.settings.jpeg_quality;

    let raw = Arc::new(raw);
    let input = Arc::clone(&raw);
    let result =
        tokio::task::spawn_blocking(move || apply_watermark(&input, &spec, format, quality)).await;

    match result {
        Ok(Ok(stamped)) => (stamped, true),
        Ok(Err(e)) => {
            debug!("Watermark failed for item {id}, keeping raw capture: {e}");
            (unwrap_raw(raw), false)
        }
        Err(e) => {
            debug!("Watermark task failed for item {id}, keeping raw capture: {e}");
            (unwrap_raw(raw), false)
        }
    }
}

fn unwrap_raw(raw: Arc<Vec<u8>>) -> Vec<u8> {
    Arc::try_unwrap(raw).unwrap_or_else(|shared| shared.as_ref().clone())
}
