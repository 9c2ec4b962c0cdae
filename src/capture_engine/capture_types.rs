//! Core types shared by the capture worker, retry controller and lanes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::store::StoreError;

/// Failure of a single capture attempt
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Navigation did not complete (DNS, connection reset, CDP navigation error)
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("{operation} timeout after {}s for {url}", .timeout.as_secs_f32())]
    Timeout {
        operation: &'static str,
        url: String,
        timeout: Duration,
    },

    /// Document response carried an error status
    #[error("HTTP error: {status}")]
    HttpStatus { status: u16 },

    #[error("capture failed: {0}")]
    Capture(String),

    /// Browser process or CDP session failure
    #[error("browser error: {0}")]
    Browser(String),

    /// Artifact store or log I/O; fatal for the run
    #[error(transparent)]
    Persist(#[from] StoreError),

    #[error("concurrency limiter closed")]
    LimiterClosed,
}

/// Coarse categories used by the retry policy and in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, DNS, connection refused or reset
    Network,
    /// Response status ≥ 400
    HttpStatus(u16),
    /// Browser crash, CDP error, screenshot failure
    Browser,
    /// Local disk I/O
    Persistence,
    Unknown,
}

impl FailureKind {
    #[must_use]
    pub fn classify(error: &CaptureError) -> Self {
        match error {
            CaptureError::Navigation { message, .. } => {
                let msg = message.to_lowercase();
                if msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("dns")
                    || msg.contains("name_not_resolved")
                    || msg.contains("network")
                    || msg.contains("unreachable")
                {
                    Self::Network
                } else {
                    Self::Unknown
                }
            }
            CaptureError::Timeout { .. } => Self::Network,
            CaptureError::HttpStatus { status } => Self::HttpStatus(*status),
            CaptureError::Capture(_) | CaptureError::Browser(_) => Self::Browser,
            CaptureError::Persist(_) => Self::Persistence,
            CaptureError::LimiterClosed => Self::Unknown,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::HttpStatus(status) => write!(f, "http-{status}"),
            Self::Browser => write!(f, "browser"),
            Self::Persistence => write!(f, "persistence"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// States of the per-item capture state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Navigating,
    AwaitingContent,
    DismissingOverlays,
    Capturing,
    Postprocessing,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Navigating => "navigating",
            Self::AwaitingContent => "awaiting-content",
            Self::DismissingOverlays => "dismissing-overlays",
            Self::Capturing => "capturing",
            Self::Postprocessing => "postprocessing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An attempt that ended in `Failed`, with the state it failed in
#[derive(Debug, thiserror::Error)]
#[error("{state}: {source}")]
pub struct AttemptError {
    pub state: CaptureState,
    pub source: CaptureError,
}

impl AttemptError {
    #[must_use]
    pub fn new(state: CaptureState, source: CaptureError) -> Self {
        Self { state, source }
    }
}

/// Record of a successful attempt
#[derive(Debug, Clone, Default)]
pub struct AttemptTrace {
    /// States in the order they were entered, `Idle` through `Done`
    pub visited: Vec<CaptureState>,
    pub artifact: Option<PathBuf>,
    /// False when post-processing fell back to the raw capture
    pub watermarked: bool,
    /// False when the content marker never appeared
    pub content_ready: bool,
}

/// Final result for one item within a lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Captured { attempts: u32 },
    /// Artifact existed before the worker started; nothing was navigated
    AlreadyPresent,
    Failed { attempts: u32, message: String },
}
