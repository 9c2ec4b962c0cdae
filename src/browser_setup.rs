//! Chromium discovery and process launch

use anyhow::{Context, Result, anyhow};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::Handler;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{CaptureConfig, Viewport};

/// Environment variable that pins the browser binary
pub const BROWSER_ENV_VAR: &str = "CHROMIUM_PATH";

/// Executable names tried against `PATH`
const PATH_CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable", "chrome"];

/// Flags applied to every lane's process
const LAUNCH_FLAGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--ignore-certificate-errors",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-hang-monitor",
    "--password-store=basic",
    "--use-mock-keychain",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Process-level launch settings shared by every lane
#[derive(Debug, Clone)]
pub struct BrowserLaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: String,
    /// CDP request timeout; navigation has its own, longer bound
    pub request_timeout: Duration,
    /// Parent directory for lane profiles (system temp dir when `None`)
    pub profile_root: Option<PathBuf>,
}

impl BrowserLaunchOptions {
    #[must_use]
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            headless: config.headless(),
            viewport: config.viewport(),
            user_agent: config.user_agent().to_string(),
            request_timeout: config.navigation_timeout(),
            profile_root: config.profile_root().map(Path::to_path_buf),
        }
    }
}

/// Well-known install locations for the current platform
fn install_locations() -> Vec<PathBuf> {
    let fixed: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    let mut locations: Vec<PathBuf> = fixed.iter().map(PathBuf::from).collect();
    if cfg!(target_os = "macos")
        && let Some(home) = dirs::home_dir()
    {
        locations.push(home.join("Applications/Google Chrome.app/Contents/MacOS/Google Chrome"));
        locations.push(home.join("Applications/Chromium.app/Contents/MacOS/Chromium"));
    }
    locations
}

/// First candidate name that resolves to an executable on `PATH`
fn search_path_var() -> Option<PathBuf> {
    PATH_CANDIDATES.iter().find_map(|name| which::which(name).ok())
}

/// Locate an installed Chrome or Chromium.
///
/// Order: `CHROMIUM_PATH`, platform install locations, then `PATH`.
pub fn find_browser_executable() -> Result<PathBuf> {
    if let Some(pinned) = std::env::var_os(BROWSER_ENV_VAR).map(PathBuf::from) {
        if pinned.exists() {
            info!(path = %pinned.display(), "browser pinned by {BROWSER_ENV_VAR}");
            return Ok(pinned);
        }
        warn!(path = %pinned.display(), "{BROWSER_ENV_VAR} is set but the file is missing");
    }

    let found = install_locations()
        .into_iter()
        .find(|location| location.exists())
        .or_else(search_path_var);

    match found {
        Some(path) => {
            info!(path = %path.display(), "browser located");
            Ok(path)
        }
        None => Err(anyhow!("no Chrome or Chromium installation found")),
    }
}

/// Download a managed Chromium into the user cache directory and return the
/// executable path.
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_root = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    let install_dir = cache_root.join("lesson_capture").join("chromium");
    info!(dir = %install_dir.display(), "fetching managed Chromium");

    tokio::fs::create_dir_all(&install_dir)
        .await
        .with_context(|| format!("creating {}", install_dir.display()))?;

    let options = BrowserFetcherOptions::builder()
        .with_path(&install_dir)
        .build()
        .context("invalid fetcher options")?;
    let installed = BrowserFetcher::new(options)
        .fetch()
        .await
        .context("Chromium download failed")?;

    debug!(folder = %installed.folder_path.display(), "managed Chromium ready");
    Ok(installed.executable_path)
}

/// Locate a browser, downloading one when none is installed
pub async fn resolve_browser_executable() -> Result<PathBuf> {
    match find_browser_executable() {
        Ok(path) => Ok(path),
        Err(e) => {
            warn!("{e}; falling back to a managed download");
            download_managed_browser().await
        }
    }
}

/// Chrome emits CDP events chromiumoxide cannot deserialize
fn is_unparsed_event(message: &str) -> bool {
    message.contains("data did not match any variant of untagged enum Message")
        || message.contains("Failed to deserialize WS response")
}

async fn pump_events(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        match event {
            Ok(()) => {}
            Err(e) if is_unparsed_event(&e.to_string()) => trace!("ignored CDP message: {e}"),
            Err(e) => error!("CDP connection error: {e:?}"),
        }
    }
    trace!("CDP event loop finished");
}

/// Launch one browser process on `user_data_dir`.
///
/// Returns the browser and the task driving its CDP connection. The caller
/// owns both and must abort the handler once the browser is closed.
pub async fn launch_browser(
    executable: &Path,
    options: &BrowserLaunchOptions,
    user_data_dir: &Path,
) -> Result<(Browser, JoinHandle<()>)> {
    let builder = BrowserConfigBuilder::default()
        .chrome_executable(executable)
        .user_data_dir(user_data_dir)
        .window_size(options.viewport.width, options.viewport.height)
        .request_timeout(options.request_timeout)
        .arg(format!("--user-agent={}", options.user_agent))
        .args(LAUNCH_FLAGS.iter().copied());
    let builder = if options.headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    let browser_config = builder
        .build()
        .map_err(|e| anyhow!("browser config rejected: {e}"))?;
    let (browser, handler) = Browser::launch(browser_config)
        .await
        .with_context(|| format!("starting {}", executable.display()))?;

    Ok((browser, tokio::spawn(pump_events(handler))))
}
