//! Getter methods for `CaptureConfig`

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{CaptureConfig, Viewport};
use crate::anomaly::AnomalyThresholds;
use crate::capture_engine::WatermarkSpec;
use crate::store::ArtifactFormat;

impl CaptureConfig {
    #[must_use]
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn progress_log_path(&self) -> PathBuf {
        self.state_dir.join(&self.progress_file)
    }

    #[must_use]
    pub fn error_log_path(&self) -> PathBuf {
        self.state_dir.join(&self.error_file)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Resolved semaphore budget (2 × pool size unless set)
    #[must_use]
    pub fn semaphore_budget(&self) -> usize {
        self.semaphore_budget
            .unwrap_or_else(|| self.pool_size.saturating_mul(2))
            .max(1)
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn total_limit(&self) -> Option<usize> {
        self.total_limit
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn terminal_statuses(&self) -> &[u16] {
        &self.terminal_statuses
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    #[must_use]
    pub fn content_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.content_wait_timeout_ms)
    }

    #[must_use]
    pub fn fallback_wait(&self) -> Duration {
        Duration::from_millis(self.fallback_wait_ms)
    }

    #[must_use]
    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }

    /// Inclusive bounds of the per-item jitter
    #[must_use]
    pub fn request_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.min_request_delay_ms),
            Duration::from_millis(self.max_request_delay_ms),
        )
    }

    #[must_use]
    pub fn content_selector(&self) -> &str {
        &self.content_selector
    }

    #[must_use]
    pub fn overlay_selectors(&self) -> &[String] {
        &self.overlay_selectors
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn accept_language(&self) -> &str {
        &self.accept_language
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn browser_executable(&self) -> Option<&Path> {
        self.browser_executable.as_deref()
    }

    #[must_use]
    pub fn profile_root(&self) -> Option<&Path> {
        self.profile_root.as_deref()
    }

    #[must_use]
    pub fn watermark(&self) -> Option<&WatermarkSpec> {
        self.watermark.as_ref()
    }

    #[must_use]
    pub fn skip_errors(&self) -> bool {
        self.skip_errors
    }

    #[must_use]
    pub fn force(&self) -> bool {
        self.force
    }

    #[must_use]
    pub fn anomaly_check(&self) -> bool {
        self.anomaly_check
    }

    #[must_use]
    pub fn anomaly_thresholds(&self) -> &AnomalyThresholds {
        &self.anomaly_thresholds
    }
}
