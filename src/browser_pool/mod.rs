//! Browser Pool Manager
//!
//! One browser process per lane. A lane launches its session once, drives
//! its whole sub-batch through the session's single page, then closes it.
//! The capture worker only sees the [`CapturePage`] capability trait, so the
//! pipeline runs unchanged against an in-process test double.

pub mod chromium;

use std::future::Future;
use std::time::Duration;

use crate::capture_engine::CaptureError;
use crate::store::ArtifactFormat;

pub use chromium::{ChromiumLauncher, ChromiumPage, ChromiumSession};

/// Page operations the capture worker drives
pub trait CapturePage: Send {
    /// Navigate and return once the DOM is parsed.
    ///
    /// Yields the main document's HTTP status when the engine reported one.
    fn navigate(
        &mut self,
        url: &str,
    ) -> impl Future<Output = Result<Option<u16>, CaptureError>> + Send;

    /// Poll for `selector` until it appears (`true`) or `timeout` elapses
    /// (`false`). `Err` means the page itself is unusable.
    fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, CaptureError>> + Send;

    /// Remove modal and overlay nodes and restore page scrolling
    fn suppress_overlays(
        &mut self,
        selectors: &[String],
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Full-page raster capture, encoded as `format`
    fn capture_full_page(
        &mut self,
        format: ArtifactFormat,
        jpeg_quality: u8,
    ) -> impl Future<Output = Result<Vec<u8>, CaptureError>> + Send;
}

/// One isolated browser process with one active page
pub trait BrowserSession: Send {
    type Page: CapturePage;

    fn page(&mut self) -> &mut Self::Page;

    /// Release the page, the browser process and its profile directory
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Starts a fresh session for a lane
pub trait BrowserLauncher: Send + Sync + 'static {
    type Session: BrowserSession + 'static;

    fn launch(&self, lane: usize) -> impl Future<Output = Result<Self::Session, CaptureError>> + Send;
}
