//! Type-safe builder for `CaptureConfig` using the typestate pattern
//!
//! `build()` only exists once both required values (artifact directory and
//! site base URL) have been supplied.

use anyhow::{Result, anyhow, bail};
use std::marker::PhantomData;
use std::path::PathBuf;
use url::Url;

use super::types::CaptureConfig;

// Type states for the builder
pub struct WithArtifactDir;
pub struct WithBaseUrl;

pub struct CaptureConfigBuilder<State = ()> {
    pub(crate) config: CaptureConfig,
    pub(crate) artifact_dir: Option<PathBuf>,
    pub(crate) base_url: Option<String>,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for CaptureConfigBuilder<()> {
    fn default() -> Self {
        Self {
            config: CaptureConfig::default(),
            artifact_dir: None,
            base_url: None,
            _phantom: PhantomData,
        }
    }
}

impl CaptureConfig {
    /// Create a builder for configuring a `CaptureConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> CaptureConfigBuilder<()> {
        CaptureConfigBuilder::default()
    }
}

impl CaptureConfigBuilder<()> {
    /// Builder whose optional settings come from `config`. The required
    /// values still have to be supplied, which lets callers override them.
    #[must_use]
    pub fn seeded(config: CaptureConfig) -> Self {
        Self {
            config,
            artifact_dir: None,
            base_url: None,
            _phantom: PhantomData,
        }
    }

    pub fn artifact_dir(self, dir: impl Into<PathBuf>) -> CaptureConfigBuilder<WithArtifactDir> {
        CaptureConfigBuilder {
            config: self.config,
            artifact_dir: Some(dir.into()),
            base_url: self.base_url,
            _phantom: PhantomData,
        }
    }
}

impl CaptureConfigBuilder<WithArtifactDir> {
    pub fn base_url(self, url: impl Into<String>) -> CaptureConfigBuilder<WithBaseUrl> {
        let url_string = url.into();

        // Normalize URL: add https:// if no scheme is present
        let normalized_url =
            if url_string.starts_with("http://") || url_string.starts_with("https://") {
                url_string
            } else {
                format!("https://{url_string}")
            };

        CaptureConfigBuilder {
            config: self.config,
            artifact_dir: self.artifact_dir,
            base_url: Some(normalized_url.trim_end_matches('/').to_string()),
            _phantom: PhantomData,
        }
    }
}

impl CaptureConfigBuilder<WithBaseUrl> {
    /// Start from an existing configuration (e.g. loaded from JSON) keeping
    /// its required values.
    #[must_use]
    pub fn from_config(config: CaptureConfig) -> Self {
        let artifact_dir = config.artifact_dir.clone();
        let base_url = config.base_url.clone();
        CaptureConfigBuilder::seeded(config)
            .artifact_dir(artifact_dir)
            .base_url(base_url)
    }

    pub fn build(self) -> Result<CaptureConfig> {
        let mut config = self.config;
        config.artifact_dir = self
            .artifact_dir
            .ok_or_else(|| anyhow!("artifact_dir is required"))?;
        config.base_url = self
            .base_url
            .ok_or_else(|| anyhow!("base_url is required"))?;

        let parsed = Url::parse(&config.base_url)
            .map_err(|e| anyhow!("Invalid base_url '{}': {e}", config.base_url))?;
        if parsed.host_str().is_none() {
            bail!("base_url '{}' has no host", config.base_url);
        }

        if config.pool_size == 0 {
            bail!("pool_size must be at least 1");
        }
        if config.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if config.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if config.semaphore_budget == Some(0) {
            bail!("semaphore_budget must be at least 1");
        }
        if !(1..=100).contains(&config.jpeg_quality) {
            bail!("jpeg_quality must be between 1 and 100, got {}", config.jpeg_quality);
        }
        if config.min_request_delay_ms > config.max_request_delay_ms {
            bail!(
                "min_request_delay_ms ({}) exceeds max_request_delay_ms ({})",
                config.min_request_delay_ms,
                config.max_request_delay_ms
            );
        }
        if config.content_selector.trim().is_empty() {
            bail!("content_selector must not be empty");
        }

        // Headed mode is a debugging aid; release builds always run headless
        #[cfg(not(debug_assertions))]
        if !config.headless {
            tracing::warn!(
                "Forcing headless mode in release build. \
                Headed mode is only available in debug builds for development."
            );
            config.headless = true;
        }

        Ok(config)
    }
}
