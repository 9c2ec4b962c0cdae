//! Capture Engine
//!
//! Orchestrator, lanes, the per-item capture worker and its retry
//! controller, plus the small pieces they share (limiter, partitioner,
//! progress reporting, watermarking).

pub mod capture_types;
pub mod content_validator;
pub mod context;
pub mod lane;
pub mod limiter;
pub mod orchestrator;
pub mod page_timeout;
pub mod partitioner;
pub mod progress;
pub mod retry;
pub mod watermark;
pub mod worker;

pub use capture_types::{
    AttemptError, AttemptTrace, CaptureError, CaptureState, FailureKind, ItemOutcome,
};
pub use content_validator::{ResponseVerdict, check_response};
pub use context::{CaptureContext, WorkerSettings};
pub use lane::{LaneReport, run_lane};
pub use limiter::ConcurrencyLimiter;
pub use orchestrator::{Orchestrator, RunMode, RunSummary, TerminationReason};
pub use partitioner::partition;
pub use progress::{CounterProgress, NoOpProgress, ProgressReporter, ProgressSnapshot};
pub use retry::{RetryDecision, RetryPolicy, capture_with_retry};
pub use watermark::{WatermarkPosition, WatermarkSpec, apply_watermark};
pub use worker::{process_item, request_jitter, run_attempt};
