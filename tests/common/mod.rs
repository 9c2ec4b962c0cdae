//! Test utilities for the lesson_capture test suite
//!
//! `FakeLauncher` stands in for Chromium: pages are rendered in memory, and
//! every navigation is counted so tests can assert on how the pipeline drove
//! the "browser".

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use lesson_capture::config::CaptureConfig;
use lesson_capture::{
    ArtifactFormat, BrowserLauncher, BrowserSession, CaptureError, CapturePage, StaticCatalog,
    WorkItem,
};
use tempfile::TempDir;

pub const BASE_URL: &str = "https://lessons.test";

/// Shared, inspectable state behind every fake session
#[derive(Default)]
pub struct FakeBrowserState {
    pub navigations: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    /// URLs whose navigation always fails
    pub failing_urls: Mutex<HashSet<String>>,
    /// URLs that fail this many more times before succeeding
    pub flaky_urls: Mutex<HashMap<String, usize>>,
    /// URLs answered with an HTTP error status
    pub statuses: Mutex<HashMap<String, u16>>,
    /// URLs that render a bot-challenge page
    pub challenge_urls: Mutex<HashSet<String>>,
    /// Lanes whose browser refuses to start
    pub failing_lanes: Mutex<HashSet<usize>>,
    /// Simulated page load time
    pub navigation_delay: Mutex<Duration>,
    /// The content marker never shows up
    pub content_absent: AtomicBool,
    /// Overlay cleanup reports an error
    pub overlay_error: AtomicBool,
    /// Bytes returned by every screenshot instead of a rendered page
    pub capture_override: Mutex<Option<Vec<u8>>>,
}

impl FakeBrowserState {
    pub fn navigation_count(&self) -> usize {
        self.navigations.lock().unwrap().len()
    }

    pub fn navigations_to(&self, url: &str) -> usize {
        self.navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|visited| visited.as_str() == url)
            .count()
    }

    pub fn fail_always(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn fail_times(&self, url: &str, times: usize) {
        self.flaky_urls.lock().unwrap().insert(url.to_string(), times);
    }

    pub fn respond_with_status(&self, url: &str, status: u16) {
        self.statuses.lock().unwrap().insert(url.to_string(), status);
    }

    pub fn serve_challenge(&self, url: &str) {
        self.challenge_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn fail_lane(&self, lane: usize) {
        self.failing_lanes.lock().unwrap().insert(lane);
    }

    pub fn set_navigation_delay(&self, delay: Duration) {
        *self.navigation_delay.lock().unwrap() = delay;
    }

    pub fn hide_content(&self) {
        self.content_absent.store(true, Ordering::SeqCst);
    }

    pub fn break_overlays(&self) {
        self.overlay_error.store(true, Ordering::SeqCst);
    }

    pub fn capture_bytes(&self, bytes: &[u8]) {
        *self.capture_override.lock().unwrap() = Some(bytes.to_vec());
    }

    pub fn visited_urls(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn reset_navigations(&self) {
        self.navigations.lock().unwrap().clear();
    }
}

#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub state: Arc<FakeBrowserState>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct FakeSession {
    page: FakePage,
    state: Arc<FakeBrowserState>,
}

pub struct FakePage {
    state: Arc<FakeBrowserState>,
    current: Option<String>,
}

impl BrowserLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self, lane: usize) -> Result<FakeSession, CaptureError> {
        if self.state.failing_lanes.lock().unwrap().contains(&lane) {
            return Err(CaptureError::Browser(format!("lane {lane} refused to start")));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            page: FakePage {
                state: Arc::clone(&self.state),
                current: None,
            },
            state: Arc::clone(&self.state),
        })
    }
}

impl BrowserSession for FakeSession {
    type Page = FakePage;

    fn page(&mut self) -> &mut FakePage {
        &mut self.page
    }

    async fn close(self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl CapturePage for FakePage {
    async fn navigate(&mut self, url: &str) -> Result<Option<u16>, CaptureError> {
        let state = &self.state;
        state.navigations.lock().unwrap().push(url.to_string());

        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *state.navigation_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let flaky = {
            let mut flaky = state.flaky_urls.lock().unwrap();
            match flaky.get_mut(url) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if flaky || state.failing_urls.lock().unwrap().contains(url) {
            return Err(CaptureError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }

        self.current = Some(url.to_string());
        Ok(Some(
            state.statuses.lock().unwrap().get(url).copied().unwrap_or(200),
        ))
    }

    async fn wait_for_selector(&mut self, _selector: &str, timeout: Duration) -> Result<bool, CaptureError> {
        if self.state.content_absent.load(Ordering::SeqCst) {
            tokio::time::sleep(timeout).await;
            return Ok(false);
        }
        Ok(true)
    }

    async fn suppress_overlays(&mut self, _selectors: &[String]) -> Result<(), CaptureError> {
        if self.state.overlay_error.load(Ordering::SeqCst) {
            return Err(CaptureError::Browser("overlay cleanup: page crashed".to_string()));
        }
        Ok(())
    }

    async fn capture_full_page(&mut self, format: ArtifactFormat, _jpeg_quality: u8) -> Result<Vec<u8>, CaptureError> {
        if let Some(bytes) = self.state.capture_override.lock().unwrap().clone() {
            return Ok(bytes);
        }
        let challenge = self
            .current
            .as_ref()
            .is_some_and(|url| self.state.challenge_urls.lock().unwrap().contains(url));
        let image = if challenge { challenge_page() } else { lesson_page() };
        Ok(encode(&image, format))
    }
}

/// A plausible lesson card: pale blue background, dark text band
pub fn lesson_page() -> RgbImage {
    let mut img = RgbImage::from_pixel(400, 300, Rgb([200, 220, 240]));
    for y in 120..180 {
        for x in 40..360 {
            img.put_pixel(x, y, Rgb([40, 40, 60]));
        }
    }
    img
}

/// White page with a red banner, like a bot-check screen
pub fn challenge_page() -> RgbImage {
    let mut img = RgbImage::from_pixel(800, 600, Rgb([255, 255, 255]));
    for y in 20..40 {
        for x in 20..120 {
            img.put_pixel(x, y, Rgb([230, 30, 40]));
        }
    }
    img
}

pub fn encode(img: &RgbImage, format: ArtifactFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    let image_format = match format {
        ArtifactFormat::Png => ImageFormat::Png,
        ArtifactFormat::Jpeg => ImageFormat::Jpeg,
    };
    img.write_to(&mut out, image_format).unwrap();
    out.into_inner()
}

pub fn items(ids: &[i64]) -> Vec<WorkItem> {
    ids.iter()
        .map(|&id| WorkItem::new(id, format!("group-{id}"), (id % 7 + 1).to_string()))
        .collect()
}

pub fn catalog(ids: &[i64]) -> StaticCatalog {
    StaticCatalog::new(items(ids))
}

pub fn url_for(id: i64) -> String {
    items(&[id])[0].target_url(BASE_URL)
}

/// Config tuned for tests: PNG, no watermark, no sleeps
pub fn test_config(dir: &TempDir) -> lesson_capture::config::CaptureConfigBuilder<lesson_capture::config::WithBaseUrl> {
    CaptureConfig::builder()
        .artifact_dir(dir.path().join("screenshots"))
        .base_url(BASE_URL)
        .state_dir(dir.path())
        .format(ArtifactFormat::Png)
        .watermark(None)
        .pool_size(1)
        .semaphore_budget(2)
        .max_attempts(2)
        .retry_delay_ms(0)
        .iteration_delay_ms(0)
        .request_delay_ms(0, 0)
        .fallback_wait_ms(0)
        .content_wait_timeout_ms(100)
        .navigation_timeout_secs(5)
}

pub fn read_to_string(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}
