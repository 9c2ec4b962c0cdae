//! Shared configuration constants for the capture pipeline
//!
//! Default values used by `CaptureConfig` and the browser plumbing so the
//! numbers live in one place instead of being scattered across call sites.

/// Number of lanes (browser instances) running in parallel
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Items dispatched per orchestrator iteration
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Capture attempts per item before it lands in the error log
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Fixed pause between two attempts for the same item
pub const DEFAULT_RETRY_DELAY_MS: u64 = 250;

/// Upper bound for a single page navigation
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 60;

/// How long to wait for the lesson content marker before falling back
pub const DEFAULT_CONTENT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Fixed wait used when the content marker never shows up
pub const DEFAULT_FALLBACK_WAIT_MS: u64 = 1_000;

/// Pause between orchestrator iterations
pub const DEFAULT_ITERATION_DELAY_SECS: u64 = 5;

/// Random pause before each capture, drawn uniformly from this range
pub const DEFAULT_MIN_REQUEST_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_REQUEST_DELAY_MS: u64 = 3_000;

/// Rows fetched per catalog page when pulling the whole catalog
pub const DEFAULT_CATALOG_PAGE_SIZE: usize = 5_000;

/// Capture viewport
pub const VIEWPORT_WIDTH: u32 = 1280;
pub const VIEWPORT_HEIGHT: u32 = 720;

/// JPEG quality: 70 keeps a full lesson page around 150-250KB
pub const JPEG_QUALITY: u8 = 70;

/// Watermark label drawn on every artifact
pub const WATERMARK_TEXT: &str = "PREVIEW";

/// Watermark alpha (0-255). Low enough to stay unobtrusive on white pages.
pub const WATERMARK_OPACITY: u8 = 40;

/// Selector that marks a rendered lesson
pub const CONTENT_MARKER_SELECTOR: &str = ".lesson-material";

/// Modal and overlay nodes removed before capture
pub const OVERLAY_SELECTORS: &[&str] = &[
    ".modal__portal",
    ".modal",
    ".student-modal-old__content",
    ".overlay",
    ".modal-backdrop",
    "[role=\"dialog\"]",
];

/// Public lesson site
pub const DEFAULT_BASE_URL: &str = "https://education.yandex.ru";

/// Progress log file name (inside the state directory)
pub const PROGRESS_FILE_NAME: &str = "screenshot_progress.txt";

/// Error log file name (inside the state directory)
pub const ERROR_FILE_NAME: &str = "screenshot_errors.txt";

/// Prefix given to artifacts flagged as bot-challenge captures
pub const QUARANTINE_PREFIX: &str = "captcha_";

/// In-progress artifact writes; leftovers are swept when a run starts
pub const PARTIAL_PREFIX: &str = ".partial_";

/// Fixed desktop user agent for every lane
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Accept-Language sent with every navigation
pub const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";
