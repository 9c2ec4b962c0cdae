//! Append-only record of items that exhausted their attempts.
//!
//! Line format is `id,url,message`. The message is the remainder of the line
//! after the second comma, so it may itself contain commas; newlines are
//! flattened on write so one entry is always one line.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub id: i64,
    pub target_url: String,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(id: i64, target_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            target_url: target_url.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn to_line(&self) -> String {
        let url = self.target_url.replace(',', "%2C");
        let message: String = self
            .message
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        format!("{},{},{}\n", self.id, url, message.trim())
    }

    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(3, ',');
        let id = fields.next()?.trim().parse().ok()?;
        let target_url = fields.next()?.trim().to_string();
        let message = fields.next().unwrap_or_default().trim().to_string();
        Some(Self {
            id,
            target_url,
            message,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &ErrorEntry) -> Result<(), StoreError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        file.write_all(entry.to_line().as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&self.path, e))
    }

    /// Entries keyed by id; for repeated ids the last line wins.
    pub async fn load(&self) -> Result<HashMap<i64, ErrorEntry>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut entries = HashMap::new();
        for line in text.lines() {
            match ErrorEntry::parse_line(line) {
                Some(entry) => {
                    entries.insert(entry.id, entry);
                }
                None if line.trim().is_empty() => {}
                None => log::debug!("Skipping malformed error log line: {line}"),
            }
        }
        Ok(entries)
    }

    pub async fn load_ids(&self) -> Result<BTreeSet<i64>, StoreError> {
        Ok(self.load().await?.into_keys().collect())
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}
