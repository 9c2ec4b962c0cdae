//! Append-only record of completed item ids, one integer per line.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::StoreError;

#[derive(Debug, Clone)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every recorded id. Lines that are not integers are ignored, and a
    /// missing file is an empty log.
    pub async fn load(&self) -> Result<BTreeSet<i64>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        Ok(text
            .lines()
            .filter_map(|line| line.trim().parse::<i64>().ok())
            .collect())
    }

    pub async fn append(&self, id: i64) -> Result<(), StoreError> {
        self.append_raw(format!("{id}\n")).await
    }

    pub async fn append_many(&self, ids: impl IntoIterator<Item = i64>) -> Result<(), StoreError> {
        let text: String = ids.into_iter().map(|id| format!("{id}\n")).collect();
        if text.is_empty() {
            return Ok(());
        }
        self.append_raw(text).await
    }

    async fn append_raw(&self, text: String) -> Result<(), StoreError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        file.write_all(text.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&self.path, e))
    }

    /// Delete the log file
    pub async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    /// Back-fill ids that have an artifact on disk but no log line.
    ///
    /// Disk state wins; ids in the log without an artifact are left alone
    /// and are simply missing again. Returns the number of ids appended.
    pub async fn reconcile(&self, on_disk: &BTreeSet<i64>) -> Result<usize, StoreError> {
        let logged = self.load().await?;
        let absent: Vec<i64> = on_disk.difference(&logged).copied().collect();
        let count = absent.len();

        if count > 0 {
            log::info!(
                "Back-filling {} artifact id(s) into progress log {}",
                count,
                self.path.display()
            );
            self.append_many(absent).await?;
        }
        Ok(count)
    }
}
