//! Flat directory of captured images keyed by item id.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tempfile::Builder as TempFileBuilder;

use super::StoreError;
use crate::utils::{PARTIAL_PREFIX, QUARANTINE_PREFIX};

/// Image encoding used for every artifact in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Jpeg,
    Png,
}

impl ArtifactFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Extensions recognised as a completed artifact regardless of the
/// configured output format
const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Parse `{id}.{ext}` into the id, negative ids included. Quarantined and
/// foreign files yield `None`.
#[must_use]
pub fn parse_artifact_file_name(name: &str) -> Option<i64> {
    let (stem, ext) = name.rsplit_once('.')?;
    if !KNOWN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
        return None;
    }
    let digits = stem.strip_prefix('-').unwrap_or(stem);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    format: ArtifactFormat,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Create the directory and drop partial writes left by a killed run.
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        let mut swept = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let is_partial = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(PARTIAL_PREFIX));
            if !is_partial {
                continue;
            }
            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => swept += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        if swept > 0 {
            log::info!("Removed {swept} partial artifact(s) from {}", self.dir.display());
        }
        Ok(())
    }

    /// Path the configured format writes for `id`
    #[must_use]
    pub fn path_for(&self, id: i64) -> PathBuf {
        self.dir.join(format!("{id}.{}", self.format.extension()))
    }

    #[must_use]
    pub fn quarantine_path_for(&self, artifact: &Path) -> Option<PathBuf> {
        let name = artifact.file_name()?.to_str()?;
        Some(artifact.with_file_name(format!("{QUARANTINE_PREFIX}{name}")))
    }

    /// Whether any artifact exists for `id`, in any known format
    #[must_use]
    pub fn exists(&self, id: i64) -> bool {
        self.existing_path(id).is_some()
    }

    #[must_use]
    pub fn existing_path(&self, id: i64) -> Option<PathBuf> {
        let preferred = self.path_for(id);
        if preferred.is_file() {
            return Some(preferred);
        }
        KNOWN_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{id}.{ext}")))
            .find(|path| path.is_file())
    }

    /// Ids of all completed artifacts. A missing directory is an empty store.
    pub async fn list_ids(&self) -> Result<BTreeSet<i64>, StoreError> {
        let mut ids = BTreeSet::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = parse_artifact_file_name(name) {
                ids.insert(id);
            }
        }

        Ok(ids)
    }

    /// Artifacts ordered newest first by modification time, at most `limit`
    pub async fn recent_artifacts(&self, limit: usize) -> Result<Vec<(i64, PathBuf)>, StoreError> {
        let mut found: Vec<(SystemTime, i64, PathBuf)> = Vec::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(parse_artifact_file_name) else {
                continue;
            };
            let path = entry.path();
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .map_err(|e| StoreError::io(&path, e))?;
            found.push((modified, id, path));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(found
            .into_iter()
            .take(limit)
            .map(|(_, id, path)| (id, path))
            .collect())
    }

    /// Write `bytes` as the artifact for `id`.
    ///
    /// The file appears under its final name only once fully written, so an
    /// interrupted run never leaves a truncated artifact that would count as
    /// done. Copies of the same id in other formats are removed afterwards.
    pub async fn write(&self, id: i64, bytes: Vec<u8>) -> Result<PathBuf, StoreError> {
        let dir = self.dir.clone();
        let target = self.path_for(id);
        let target_for_task = target.clone();
        let stale: Vec<PathBuf> = KNOWN_EXTENSIONS
            .iter()
            .filter(|ext| **ext != self.format.extension())
            .map(|ext| self.dir.join(format!("{id}.{ext}")))
            .collect();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut temp = TempFileBuilder::new()
                .prefix(PARTIAL_PREFIX)
                .tempfile_in(&dir)
                .map_err(|e| StoreError::io(&dir, e))?;
            temp.write_all(&bytes)
                .map_err(|e| StoreError::io(temp.path(), e))?;
            temp.persist(&target_for_task)
                .map_err(|e| StoreError::io(&target_for_task, e.error))?;

            for path in stale {
                match std::fs::remove_file(&path) {
                    Ok(()) => log::debug!("Replaced {}", path.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StoreError::io(&path, e)),
                }
            }
            Ok(())
        })
        .await??;

        Ok(target)
    }

    /// Rename an artifact to the quarantine convention.
    ///
    /// Replaces any earlier quarantined copy so the original name never
    /// coexists with its quarantined counterpart.
    pub async fn quarantine(&self, artifact: &Path) -> Result<PathBuf, StoreError> {
        let quarantined = self.quarantine_path_for(artifact).ok_or_else(|| {
            StoreError::io(
                artifact,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact has no file name"),
            )
        })?;

        tokio::fs::rename(artifact, &quarantined)
            .await
            .map_err(|e| StoreError::io(artifact, e))?;

        log::warn!(
            "Quarantined {} -> {}",
            artifact.display(),
            quarantined.display()
        );
        Ok(quarantined)
    }
}
