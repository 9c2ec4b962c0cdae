//! Shared per-run state handed to every lane.

use std::sync::Arc;
use std::time::Duration;

use super::limiter::ConcurrencyLimiter;
use super::progress::ProgressReporter;
use super::retry::RetryPolicy;
use super::watermark::WatermarkSpec;
use crate::config::CaptureConfig;
use crate::store::{ArtifactFormat, ArtifactStore, ErrorLog, ProgressLog};

/// Page-level knobs the capture worker needs for every attempt
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub navigation_timeout: Duration,
    pub content_selector: String,
    pub content_wait_timeout: Duration,
    pub fallback_wait: Duration,
    /// Inclusive bounds of the pause taken before each captured item
    pub request_delay: (Duration, Duration),
    pub overlay_selectors: Vec<String>,
    pub format: ArtifactFormat,
    pub jpeg_quality: u8,
    pub watermark: Option<WatermarkSpec>,
}

impl WorkerSettings {
    #[must_use]
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout(),
            content_selector: config.content_selector().to_string(),
            content_wait_timeout: config.content_wait_timeout(),
            fallback_wait: config.fallback_wait(),
            request_delay: config.request_delay_range(),
            overlay_selectors: config.overlay_selectors().to_vec(),
            format: config.format(),
            jpeg_quality: config.jpeg_quality(),
            watermark: config.watermark().cloned(),
        }
    }
}

/// Everything a lane shares with the other lanes during one run
pub struct CaptureContext {
    pub base_url: String,
    pub store: ArtifactStore,
    pub progress_log: ProgressLog,
    pub error_log: ErrorLog,
    pub limiter: ConcurrencyLimiter,
    pub retry_policy: RetryPolicy,
    pub settings: WorkerSettings,
    /// Recapture even when an artifact already exists
    pub force: bool,
    pub reporter: Arc<dyn ProgressReporter>,
}

impl CaptureContext {
    #[must_use]
    pub fn from_config(config: &CaptureConfig, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            store: ArtifactStore::new(config.artifact_dir(), config.format()),
            progress_log: ProgressLog::new(config.progress_log_path()),
            error_log: ErrorLog::new(config.error_log_path()),
            limiter: ConcurrencyLimiter::new(config.semaphore_budget()),
            retry_policy: RetryPolicy::from_config(config),
            settings: WorkerSettings::from_config(config),
            force: config.force(),
            reporter,
        }
    }
}
