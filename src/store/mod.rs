//! On-disk state shared by all lanes: the artifact directory, the progress
//! log and the error log.
//!
//! File existence in the artifact directory is the completion signal. The two
//! logs are append-only plain text files; lanes never touch the same id so
//! single-line appends need no cross-lane locking.

pub mod artifact_store;
pub mod error_log;
pub mod progress_log;

use std::path::{Path, PathBuf};

pub use artifact_store::{ArtifactFormat, ArtifactStore, parse_artifact_file_name};
pub use error_log::{ErrorEntry, ErrorLog};
pub use progress_log::ProgressLog;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
