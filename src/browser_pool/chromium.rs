//! chromiumoxide-backed implementation of the browser pool traits

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, LoaderId, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, FrameId, NavigateParams, SetBypassCspParams,
};
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserLauncher, BrowserSession, CapturePage};
use crate::browser_profile::LaneProfile;
use crate::browser_setup::{BrowserLaunchOptions, launch_browser, resolve_browser_executable};
use crate::capture_engine::CaptureError;
use crate::config::CaptureConfig;
use crate::store::ArtifactFormat;

const DOM_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(150);
/// Upper bound on waiting for the main document's response event
const STATUS_EVENT_WAIT: Duration = Duration::from_millis(500);

fn browser_error(context: &str, e: impl std::fmt::Display) -> CaptureError {
    CaptureError::Browser(format!("{context}: {e}"))
}

/// Launches one Chrome process per lane
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Arc<PathBuf>,
    options: BrowserLaunchOptions,
    accept_language: String,
}

impl ChromiumLauncher {
    /// Resolve the browser executable once, downloading Chromium if needed.
    pub async fn prepare(config: &CaptureConfig) -> anyhow::Result<Self> {
        let executable = match config.browser_executable() {
            Some(path) => path.to_path_buf(),
            None => resolve_browser_executable().await?,
        };
        info!("Using browser executable {}", executable.display());

        Ok(Self {
            executable: Arc::new(executable),
            options: BrowserLaunchOptions::from_config(config),
            accept_language: config.accept_language().to_string(),
        })
    }

    async fn open_page(&self, browser: &Browser) -> Result<Page, CaptureError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| browser_error("new page", e))?;
        self.configure_page(&page).await?;
        Ok(page)
    }

    async fn configure_page(&self, page: &Page) -> Result<(), CaptureError> {
        let viewport = self.options.viewport;
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(viewport.width))
                .height(i64::from(viewport.height))
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| browser_error("device metrics", e))?,
        )
        .await
        .map_err(|e| browser_error("device metrics", e))?;

        page.execute(
            SetUserAgentOverrideParams::builder()
                .user_agent(self.options.user_agent.clone())
                .accept_language(self.accept_language.clone())
                .build()
                .map_err(|e| browser_error("user agent", e))?,
        )
        .await
        .map_err(|e| browser_error("user agent", e))?;

        page.execute(SetBypassCspParams::new(true))
            .await
            .map_err(|e| browser_error("bypass CSP", e))?;

        page.execute(SetIgnoreCertificateErrorsParams::new(true))
            .await
            .map_err(|e| browser_error("ignore certificate errors", e))?;

        Ok(())
    }
}

impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self, lane: usize) -> Result<ChromiumSession, CaptureError> {
        let profile = LaneProfile::create(self.options.profile_root.as_deref(), &format!("lane{lane}"))
            .map_err(|e| browser_error("profile", format!("{e:#}")))?;

        let (browser, handler) = launch_browser(&self.executable, &self.options, profile.dir())
            .await
            .map_err(|e| browser_error("launch", format!("{e:#}")))?;

        let page = match self.open_page(&browser).await {
            Ok(page) => page,
            Err(e) => {
                // Dropping the browser kills the process; the profile goes with it
                handler.abort();
                return Err(e);
            }
        };

        debug!("Lane {lane} browser ready");
        Ok(ChromiumSession {
            lane,
            browser,
            handler,
            page: ChromiumPage::new(page),
            _profile: profile,
        })
    }
}

/// A running browser, its CDP handler task and its profile directory
pub struct ChromiumSession {
    lane: usize,
    browser: Browser,
    handler: JoinHandle<()>,
    page: ChromiumPage,
    _profile: LaneProfile,
}

impl BrowserSession for ChromiumSession {
    type Page = ChromiumPage;

    fn page(&mut self) -> &mut ChromiumPage {
        &mut self.page
    }

    async fn close(mut self) {
        if let Err(e) = self.page.page.clone().close().await {
            debug!("Lane {} page close failed: {}", self.lane, e);
        }
        if let Err(e) = self.browser.close().await {
            warn!("Lane {} failed to close browser: {}", self.lane, e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Lane {} failed to wait for browser exit: {}", self.lane, e);
        }
        debug!("Lane {} browser closed", self.lane);
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// The single page a lane drives
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    fn new(page: Page) -> Self {
        Self { page }
    }

    async fn ready_state(&self) -> Result<String, CaptureError> {
        self.page
            .evaluate("document.readyState")
            .await
            .map_err(|e| browser_error("readyState", e))?
            .into_value::<String>()
            .map_err(|e| browser_error("readyState", e))
    }

    /// Wait for DOMContentLoaded rather than the full load event
    async fn wait_for_dom(&self) -> Result<(), CaptureError> {
        loop {
            if self.ready_state().await? != "loading" {
                return Ok(());
            }
            tokio::time::sleep(DOM_POLL_INTERVAL).await;
        }
    }
}

/// Identity of the document a `Page.navigate` call started
#[derive(Debug, Clone)]
struct NavigationTarget {
    frame_id: FrameId,
    /// Absent for same-document navigations
    loader_id: Option<LoaderId>,
}

impl NavigationTarget {
    /// Whether a response belongs to this navigation's document.
    ///
    /// Subresources share the document's loader, and iframes load their own
    /// documents under other loaders, so both the type and the loader must
    /// match.
    fn owns(&self, kind: &ResourceType, loader_id: &LoaderId, frame_id: Option<&FrameId>) -> bool {
        if *kind != ResourceType::Document {
            return false;
        }
        match &self.loader_id {
            Some(expected) => expected == loader_id,
            None => frame_id == Some(&self.frame_id),
        }
    }
}

/// Status of the navigated document's response, returned as soon as it is seen
async fn document_status(
    events: &mut EventStream<EventResponseReceived>,
    target: &NavigationTarget,
) -> Option<u16> {
    let deadline = Instant::now() + STATUS_EVENT_WAIT;

    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(event)) => {
                if target.owns(&event.r#type, &event.loader_id, event.frame_id.as_ref()) {
                    return u16::try_from(event.response.status).ok();
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    debug!("No response event for frame {:?}", target.frame_id);
    None
}

impl CapturePage for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<Option<u16>, CaptureError> {
        let navigation_error = |e: &dyn std::fmt::Display| CaptureError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| browser_error("response listener", e))?;

        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| navigation_error(&e))?;

        if let Some(error_text) = &response.result.error_text {
            return Err(navigation_error(error_text));
        }
        let target = NavigationTarget {
            frame_id: response.result.frame_id.clone(),
            loader_id: response.result.loader_id.clone(),
        };

        self.wait_for_dom().await?;
        Ok(document_status(&mut events, &target).await)
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, CaptureError> {
        let literal = serde_json::to_string(selector)
            .map_err(|e| browser_error("selector", e))?;
        let script = format!("document.querySelector({literal}) !== null");
        let deadline = Instant::now() + timeout;

        loop {
            let found = self
                .page
                .evaluate(script.as_str())
                .await
                .map_err(|e| browser_error("selector query", e))?
                .into_value::<bool>()
                .unwrap_or(false);

            if found {
                return Ok(true);
            }
            if Instant::now() + SELECTOR_POLL_INTERVAL > deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn suppress_overlays(&mut self, selectors: &[String]) -> Result<(), CaptureError> {
        let list = serde_json::to_string(selectors).map_err(|e| browser_error("overlays", e))?;
        let script = format!(
            r#"(() => {{
                let removed = 0;
                for (const sel of {list}) {{
                    document.querySelectorAll(sel).forEach(el => {{ el.remove(); removed++; }});
                }}
                if (document.body) {{
                    document.body.style.overflow = 'auto';
                    document.body.style.position = '';
                    document.body.style.paddingRight = '0';
                }}
                document.documentElement.style.overflow = 'auto';
                return removed;
            }})()"#
        );

        let removed = self
            .page
            .evaluate(script.as_str())
            .await
            .map_err(|e| browser_error("overlay cleanup", e))?
            .into_value::<u64>()
            .unwrap_or(0);

        if removed > 0 {
            debug!("Removed {removed} overlay node(s)");
        }
        Ok(())
    }

    async fn capture_full_page(
        &mut self,
        format: ArtifactFormat,
        jpeg_quality: u8,
    ) -> Result<Vec<u8>, CaptureError> {
        let params = match format {
            ArtifactFormat::Jpeg => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(i64::from(jpeg_quality))
                .full_page(true)
                .build(),
            ArtifactFormat::Png => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build(),
        };

        self.page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::Capture(e.to_string()))
    }
}
