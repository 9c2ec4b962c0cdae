//! Builder methods available for all states

use std::path::PathBuf;

use super::builder::CaptureConfigBuilder;
use super::types::Viewport;
use crate::anomaly::AnomalyThresholds;
use crate::capture_engine::WatermarkSpec;
use crate::store::ArtifactFormat;

impl<State> CaptureConfigBuilder<State> {
    /// Directory for the progress and error logs (default: current directory)
    #[must_use]
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.state_dir = dir.into();
        self
    }

    #[must_use]
    pub fn progress_file(mut self, name: impl Into<String>) -> Self {
        self.config.progress_file = name.into();
        self
    }

    #[must_use]
    pub fn error_file(mut self, name: impl Into<String>) -> Self {
        self.config.error_file = name.into();
        self
    }

    #[must_use]
    pub fn format(mut self, format: ArtifactFormat) -> Self {
        self.config.format = format;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    /// Number of lanes (browser processes) per iteration
    #[must_use]
    pub fn pool_size(mut self, lanes: usize) -> Self {
        self.config.pool_size = lanes;
        self
    }

    /// Global cap on in-flight page operations. Defaults to twice the pool size.
    #[must_use]
    pub fn semaphore_budget(mut self, budget: usize) -> Self {
        self.config.semaphore_budget = Some(budget);
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    #[must_use]
    pub fn total_limit(mut self, limit: Option<usize>) -> Self {
        self.config.total_limit = limit;
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    /// HTTP statuses that fail an item immediately instead of being retried
    #[must_use]
    pub fn terminal_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.config.terminal_statuses = statuses;
        self
    }

    #[must_use]
    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn content_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.config.content_wait_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn fallback_wait_ms(mut self, ms: u64) -> Self {
        self.config.fallback_wait_ms = ms;
        self
    }

    #[must_use]
    pub fn iteration_delay_ms(mut self, ms: u64) -> Self {
        self.config.iteration_delay_ms = ms;
        self
    }

    /// Pause before each capture, uniform in `min_ms..=max_ms`. `(0, 0)` disables it.
    #[must_use]
    pub fn request_delay_ms(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.config.min_request_delay_ms = min_ms;
        self.config.max_request_delay_ms = max_ms;
        self
    }

    #[must_use]
    pub fn content_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.content_selector = selector.into();
        self
    }

    #[must_use]
    pub fn overlay_selectors(mut self, selectors: Vec<String>) -> Self {
        self.config.overlay_selectors = selectors;
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport = Viewport { width, height };
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.config.accept_language = accept_language.into();
        self
    }

    /// Set browser headless mode
    ///
    /// Headed mode is only honoured in debug builds; release builds force
    /// headless with a warning.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn browser_executable(mut self, path: Option<PathBuf>) -> Self {
        self.config.browser_executable = path;
        self
    }

    #[must_use]
    pub fn profile_root(mut self, path: Option<PathBuf>) -> Self {
        self.config.profile_root = path;
        self
    }

    /// `None` disables watermarking
    #[must_use]
    pub fn watermark(mut self, spec: Option<WatermarkSpec>) -> Self {
        self.config.watermark = spec;
        self
    }

    #[must_use]
    pub fn skip_errors(mut self, skip: bool) -> Self {
        self.config.skip_errors = skip;
        self
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.config.force = force;
        self
    }

    #[must_use]
    pub fn anomaly_check(mut self, enabled: bool) -> Self {
        self.config.anomaly_check = enabled;
        self
    }

    #[must_use]
    pub fn anomaly_thresholds(mut self, thresholds: AnomalyThresholds) -> Self {
        self.config.anomaly_thresholds = thresholds;
        self
    }
}
