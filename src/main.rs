// Lesson card screenshot capture
//
// Captures a full-page screenshot of every catalog item that has no artifact
// yet, resuming from whatever a previous run left on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lesson_capture::anomaly::{AnomalyDetector, quarantine_artifact};
use lesson_capture::config::{CaptureConfigBuilder, WithBaseUrl};
use lesson_capture::{
    ArtifactFormat, ArtifactStore, CaptureConfig, CatalogQuery, CatalogSource, ChromiumLauncher,
    CounterProgress, ErrorLog, Orchestrator, ProgressLog, RunMode, RunSummary, SqliteCatalog,
    StaticCatalog, WorkCatalog,
};

#[derive(Debug, Parser)]
#[command(name = "lesson-capture", version, about = "Screenshot capture for public lesson cards")]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database holding the card catalog
    #[arg(long, global = true)]
    catalog_db: Option<PathBuf>,

    /// Text catalog with `id,group,order` lines (instead of --catalog-db)
    #[arg(long, global = true, conflicts_with = "catalog_db")]
    catalog_file: Option<PathBuf>,

    /// Catalog table name
    #[arg(long, global = true)]
    catalog_table: Option<String>,

    #[arg(long, global = true)]
    artifact_dir: Option<PathBuf>,

    /// Directory for the progress and error logs
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture missing artifacts until nothing is missing or no progress is made
    Run(RunArgs),
    /// Print the missing set without capturing
    Check {
        #[arg(long)]
        skip_errors: bool,
        /// Also write the missing ids, one per line, to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check recent artifacts for bot-challenge pages and quarantine them
    Scan {
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },
    /// Empty the progress log
    ClearProgress,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Cap on items dispatched over the whole run
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// Reprocess ids from the error log instead of the missing set
    #[arg(long, conflicts_with = "ids")]
    retry_errors: bool,
    /// Recapture even when artifacts exist
    #[arg(long)]
    force: bool,
    /// Leave ids recorded in the error log alone
    #[arg(long)]
    skip_errors: bool,
    /// Only these ids
    #[arg(long, value_delimiter = ',')]
    ids: Option<Vec<i64>>,
    #[arg(long)]
    pool_size: Option<usize>,
    /// Seconds between iterations
    #[arg(long)]
    delay: Option<u64>,
    /// Lower bound, in seconds, of the random pause before each capture
    #[arg(long)]
    min_request_delay: Option<f64>,
    /// Upper bound, in seconds, of the random pause before each capture
    #[arg(long)]
    max_request_delay: Option<f64>,
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Quarantine bot-challenge captures after every iteration
    #[arg(long)]
    anomaly_check: bool,
    /// Store PNG instead of JPEG
    #[arg(long)]
    png: bool,
    #[arg(long)]
    no_watermark: bool,
    /// HTTP status that fails an item without retrying (repeatable)
    #[arg(long = "no-retry-status")]
    no_retry_status: Vec<u16>,
    /// Show the browser window (debug builds only)
    #[arg(long)]
    headed: bool,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_file_config(cli: &Cli) -> Result<CaptureConfig> {
    match &cli.config {
        Some(path) => CaptureConfig::from_json_file(path),
        None => Ok(CaptureConfig::default()),
    }
}

/// Layer the global flags over the config file (or the defaults)
fn base_builder(cli: &Cli, file_config: &CaptureConfig) -> CaptureConfigBuilder<WithBaseUrl> {
    let artifact_dir = cli
        .artifact_dir
        .clone()
        .unwrap_or_else(|| file_config.artifact_dir().to_path_buf());
    let base_url = cli
        .base_url
        .clone()
        .unwrap_or_else(|| file_config.base_url().to_string());
    let state_dir = cli
        .state_dir
        .clone()
        .unwrap_or_else(|| file_config.state_dir().to_path_buf());

    CaptureConfigBuilder::seeded(file_config.clone())
        .artifact_dir(artifact_dir)
        .base_url(base_url)
        .state_dir(state_dir)
}

fn apply_run_args(
    builder: CaptureConfigBuilder<WithBaseUrl>,
    args: &RunArgs,
    file_config: &CaptureConfig,
) -> CaptureConfigBuilder<WithBaseUrl> {
    let mut builder = builder
        .total_limit(args.limit.or(file_config.total_limit()))
        .force(args.force || file_config.force())
        .skip_errors(args.skip_errors || file_config.skip_errors())
        .anomaly_check(args.anomaly_check || file_config.anomaly_check());

    if let Some(size) = args.batch_size {
        builder = builder.batch_size(size);
    }
    if let Some(lanes) = args.pool_size {
        builder = builder.pool_size(lanes);
    }
    if let Some(secs) = args.delay {
        builder = builder.iteration_delay_ms(secs.saturating_mul(1_000));
    }
    if args.min_request_delay.is_some() || args.max_request_delay.is_some() {
        let (min, max) = file_config.request_delay_range();
        let to_ms = |secs: f64| (secs.max(0.0) * 1_000.0).round() as u64;
        builder = builder.request_delay_ms(
            args.min_request_delay.map_or(min.as_millis() as u64, to_ms),
            args.max_request_delay.map_or(max.as_millis() as u64, to_ms),
        );
    }
    if let Some(attempts) = args.max_attempts {
        builder = builder.max_attempts(attempts);
    }
    if args.png {
        builder = builder.format(ArtifactFormat::Png);
    }
    if args.no_watermark {
        builder = builder.watermark(None);
    }
    if !args.no_retry_status.is_empty() {
        let mut statuses = file_config.terminal_statuses().to_vec();
        statuses.extend(&args.no_retry_status);
        builder = builder.terminal_statuses(statuses);
    }
    if args.headed {
        builder = builder.headless(false);
    }
    builder
}

async fn open_catalog(cli: &Cli) -> Result<CatalogSource> {
    if let Some(path) = &cli.catalog_file {
        let catalog = StaticCatalog::from_file(path)
            .await
            .with_context(|| format!("Failed to load catalog file {}", path.display()))?;
        return Ok(CatalogSource::Static(catalog));
    }

    let Some(path) = &cli.catalog_db else {
        bail!("A catalog is required: pass --catalog-db or --catalog-file");
    };
    let mut query = CatalogQuery::default();
    if let Some(table) = &cli.catalog_table {
        query.table = table.clone();
    }
    let catalog = SqliteCatalog::open(path, query)
        .await
        .with_context(|| format!("Failed to open catalog database {}", path.display()))?;
    Ok(CatalogSource::Sqlite(catalog))
}

fn print_summary(summary: &RunSummary) {
    println!("Capture run finished: {}", summary.reason);
    println!("  iterations:        {}", summary.iterations);
    println!("  attempted:         {}", summary.attempted);
    println!("  succeeded:         {}", summary.succeeded);
    println!("  failed:            {}", summary.failed);
    println!("  already present:   {}", summary.skipped);
    println!("  quarantined:       {}", summary.quarantined);
    println!("  new artifacts:     {}", summary.produced);
    println!("  still missing:     {}", summary.remaining_missing);
    println!(
        "  elapsed:           {:.1}s ({:.2} artifacts/s)",
        summary.elapsed.as_secs_f64(),
        summary.throughput()
    );
}

async fn run_capture(cli: &Cli, args: &RunArgs) -> Result<()> {
    let file_config = load_file_config(cli)?;
    let config = apply_run_args(base_builder(cli, &file_config), args, &file_config).build()?;
    let catalog = open_catalog(cli).await?;
    let launcher = ChromiumLauncher::prepare(&config).await?;

    let mode = if args.retry_errors {
        RunMode::RetryErrors
    } else if let Some(ids) = &args.ids {
        RunMode::Ids(ids.clone())
    } else {
        RunMode::Missing
    };

    let orchestrator = Orchestrator::new(config, catalog, launcher)
        .with_reporter(Arc::new(CounterProgress::default()));
    let summary = orchestrator.run(mode).await?;

    info!(
        reason = %summary.reason,
        produced = summary.produced,
        failed = summary.failed,
        "Run complete"
    );
    print_summary(&summary);
    Ok(())
}

async fn check_missing(cli: &Cli, skip_errors: bool, output: Option<&Path>) -> Result<()> {
    let file_config = load_file_config(cli)?;
    let config = base_builder(cli, &file_config)
        .skip_errors(skip_errors || file_config.skip_errors())
        .build()?;
    let catalog = open_catalog(cli).await?;
    let total = catalog.fetch_items().await?.len();

    // The launcher is never started; the missing set only needs the catalog and the store
    let orchestrator = Orchestrator::new(config, catalog, NoBrowser);
    let missing = orchestrator.missing_set().await?;

    println!("{} of {} catalog items are missing", missing.len(), total);
    for item in missing.iter().take(20) {
        println!("  {}", item.id);
    }
    if missing.len() > 20 {
        println!("  ... and {} more", missing.len() - 20);
    }

    if let Some(path) = output {
        let text: String = missing.iter().map(|item| format!("{}\n", item.id)).collect();
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Missing ids written to {}", path.display());
    }
    Ok(())
}

async fn scan_recent(cli: &Cli, recent: usize) -> Result<()> {
    let config = base_builder(cli, &load_file_config(cli)?).build()?;
    let store = ArtifactStore::new(config.artifact_dir(), config.format());
    let error_log = ErrorLog::new(config.error_log_path());
    let detector = AnomalyDetector::new(config.anomaly_thresholds().clone());

    let flagged = detector.scan_recent(&store, recent).await?;
    if flagged.is_empty() {
        println!("No anomalies in the {recent} most recent artifacts");
        return Ok(());
    }

    // Target URLs are recorded when the catalog can still resolve the ids
    let urls: HashMap<i64, String> = match open_catalog(cli).await {
        Ok(catalog) => {
            let ids: Vec<i64> = flagged.iter().map(|(id, _, _)| *id).collect();
            catalog
                .fetch_by_ids(&ids)
                .await?
                .into_iter()
                .map(|item| (item.id, item.target_url(config.base_url())))
                .collect()
        }
        Err(e) => {
            warn!("Recording quarantined items without URLs: {e:#}");
            HashMap::new()
        }
    };

    for (id, path, stats) in &flagged {
        let url = urls.get(id).map_or("", String::as_str);
        let moved = quarantine_artifact(&store, &error_log, *id, path, url).await?;
        println!(
            "Quarantined {id}: {} red, {} white pixels -> {}",
            stats.red_pixels,
            stats.center_white_pixels,
            moved.display()
        );
    }
    Ok(())
}

async fn clear_progress(cli: &Cli) -> Result<()> {
    let config = base_builder(cli, &load_file_config(cli)?).build()?;
    let progress = ProgressLog::new(config.progress_log_path());
    progress.clear().await?;
    println!("Cleared {}", progress.path().display());
    Ok(())
}

/// Launcher for commands that never open a page
struct NoBrowser;

impl lesson_capture::BrowserLauncher for NoBrowser {
    type Session = lesson_capture::ChromiumSession;

    async fn launch(&self, _lane: usize) -> Result<Self::Session, lesson_capture::CaptureError> {
        Err(lesson_capture::CaptureError::Browser(
            "no browser available for this command".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Command::Run(args) => run_capture(&cli, args).await,
        Command::Check {
            skip_errors,
            output,
        } => check_missing(&cli, *skip_errors, output.as_deref()).await,
        Command::Scan { recent } => scan_recent(&cli, *recent).await,
        Command::ClearProgress => clear_progress(&cli).await,
    }
}
