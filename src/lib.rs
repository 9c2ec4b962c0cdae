pub mod anomaly;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod capture_engine;
pub mod catalog;
pub mod config;
pub mod store;
pub mod utils;

pub use anomaly::{AnomalyDetector, AnomalyThresholds, PixelStats, quarantine_artifact};
pub use browser_pool::{
    BrowserLauncher, BrowserSession, CapturePage, ChromiumLauncher, ChromiumPage, ChromiumSession,
};
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use capture_engine::{
    CaptureError, CounterProgress, ItemOutcome, Orchestrator, ProgressReporter, RunMode,
    RunSummary, TerminationReason, WatermarkPosition, WatermarkSpec,
};
pub use catalog::{CatalogQuery, CatalogSource, SqliteCatalog, StaticCatalog, WorkCatalog, WorkItem};
pub use config::CaptureConfig;
pub use store::{ArtifactFormat, ArtifactStore, ErrorEntry, ErrorLog, ProgressLog};

/// Capture every missing item of `catalog` with a real Chromium pool.
pub async fn capture<C: WorkCatalog>(config: CaptureConfig, catalog: C) -> anyhow::Result<RunSummary> {
    let launcher = ChromiumLauncher::prepare(&config).await?;
    Orchestrator::new(config, catalog, launcher)
        .run(RunMode::Missing)
        .await
}
