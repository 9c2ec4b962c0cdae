//! Core configuration types for capture runs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyThresholds;
use crate::capture_engine::WatermarkSpec;
use crate::store::ArtifactFormat;
use crate::utils::{
    ACCEPT_LANGUAGE, CHROME_USER_AGENT, CONTENT_MARKER_SELECTOR, DEFAULT_BASE_URL,
    DEFAULT_BATCH_SIZE, DEFAULT_CONTENT_WAIT_TIMEOUT_MS, DEFAULT_FALLBACK_WAIT_MS,
    DEFAULT_ITERATION_DELAY_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_REQUEST_DELAY_MS,
    DEFAULT_MIN_REQUEST_DELAY_MS, DEFAULT_NAVIGATION_TIMEOUT_SECS,
    DEFAULT_POOL_SIZE, DEFAULT_RETRY_DELAY_MS, ERROR_FILE_NAME, JPEG_QUALITY, OVERLAY_SELECTORS,
    PROGRESS_FILE_NAME, VIEWPORT_HEIGHT, VIEWPORT_WIDTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
        }
    }
}

/// Main configuration struct for a capture run
///
/// Passed to the orchestrator at construction; nothing reads process-wide
/// settings after that.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Flat directory of `{id}.{ext}` artifacts
    pub(crate) artifact_dir: PathBuf,
    /// Directory holding the progress and error logs
    pub(crate) state_dir: PathBuf,
    pub(crate) progress_file: String,
    pub(crate) error_file: String,
    /// Scheme and host of the lesson site, no trailing slash
    pub(crate) base_url: String,
    pub(crate) format: ArtifactFormat,
    pub(crate) jpeg_quality: u8,

    /// Number of lanes, one browser process each
    pub(crate) pool_size: usize,
    /// In-flight page operations across all lanes; `None` means 2 × pool size
    pub(crate) semaphore_budget: Option<usize>,
    pub(crate) batch_size: usize,
    /// Cap on items dispatched over the whole run
    pub(crate) total_limit: Option<usize>,

    pub(crate) max_attempts: u32,
    pub(crate) retry_delay_ms: u64,
    /// HTTP statuses recorded as failures without further attempts
    pub(crate) terminal_statuses: Vec<u16>,

    pub(crate) navigation_timeout_secs: u64,
    pub(crate) content_wait_timeout_ms: u64,
    pub(crate) fallback_wait_ms: u64,
    pub(crate) iteration_delay_ms: u64,
    /// Bounds of the per-item pause taken before a capture
    pub(crate) min_request_delay_ms: u64,
    pub(crate) max_request_delay_ms: u64,

    pub(crate) content_selector: String,
    pub(crate) overlay_selectors: Vec<String>,
    pub(crate) viewport: Viewport,
    pub(crate) user_agent: String,
    pub(crate) accept_language: String,
    pub(crate) headless: bool,
    /// Explicit browser binary; discovered or downloaded when `None`
    pub(crate) browser_executable: Option<PathBuf>,
    /// Parent of the per-lane profile directories
    pub(crate) profile_root: Option<PathBuf>,

    /// `None` stores captures untouched
    pub(crate) watermark: Option<WatermarkSpec>,

    /// Exclude ids present in the error log from the work set
    pub(crate) skip_errors: bool,
    /// Recapture even when artifacts exist; clears the progress log
    pub(crate) force: bool,
    /// Run the anomaly detector over each iteration's captures
    pub(crate) anomaly_check: bool,
    pub(crate) anomaly_thresholds: AnomalyThresholds,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("screenshots"),
            state_dir: PathBuf::from("."),
            progress_file: PROGRESS_FILE_NAME.to_string(),
            error_file: ERROR_FILE_NAME.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            format: ArtifactFormat::Jpeg,
            jpeg_quality: JPEG_QUALITY,
            pool_size: DEFAULT_POOL_SIZE,
            semaphore_budget: None,
            batch_size: DEFAULT_BATCH_SIZE,
            total_limit: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            terminal_statuses: Vec::new(),
            navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
            content_wait_timeout_ms: DEFAULT_CONTENT_WAIT_TIMEOUT_MS,
            fallback_wait_ms: DEFAULT_FALLBACK_WAIT_MS,
            iteration_delay_ms: DEFAULT_ITERATION_DELAY_SECS * 1_000,
            min_request_delay_ms: DEFAULT_MIN_REQUEST_DELAY_MS,
            max_request_delay_ms: DEFAULT_MAX_REQUEST_DELAY_MS,
            content_selector: CONTENT_MARKER_SELECTOR.to_string(),
            overlay_selectors: OVERLAY_SELECTORS.iter().map(ToString::to_string).collect(),
            viewport: Viewport::default(),
            user_agent: CHROME_USER_AGENT.to_string(),
            accept_language: ACCEPT_LANGUAGE.to_string(),
            headless: true,
            browser_executable: None,
            profile_root: None,
            watermark: Some(WatermarkSpec::default()),
            skip_errors: false,
            force: false,
            anomaly_check: false,
            anomaly_thresholds: AnomalyThresholds::default(),
        }
    }
}

impl CaptureConfig {
    /// Load a configuration from JSON. Missing keys take their defaults.
    ///
    /// The result is unvalidated; pass it through
    /// [`CaptureConfigBuilder::from_config`](super::CaptureConfigBuilder::from_config)
    /// and `build()` before use.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}
