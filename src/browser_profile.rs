//! Per-lane Chrome profile directories
//!
//! Chrome holds a SingletonLock on its profile, so two lane processes can
//! never share one. Each lane gets its own UUID-named directory for the
//! lifetime of its session.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix for every profile directory this crate creates
pub const PROFILE_PREFIX: &str = "lesson_capture_chrome";

/// Profile directory owned by one lane; deleted on drop
#[derive(Debug)]
pub struct LaneProfile {
    dir: PathBuf,
}

impl LaneProfile {
    /// Create `{root}/{PROFILE_PREFIX}_{label}_{uuid}`.
    ///
    /// `root` defaults to the system temp directory. The leaf is made with
    /// `create_dir`, so an existing directory is an error.
    pub fn create(root: Option<&Path>, label: &str) -> Result<Self> {
        let root = root.map_or_else(std::env::temp_dir, Path::to_path_buf);
        std::fs::create_dir_all(&root)
            .with_context(|| format!("profile root {} is not usable", root.display()))?;

        let dir = root.join(format!("{PROFILE_PREFIX}_{label}_{}", Uuid::new_v4().simple()));
        std::fs::create_dir(&dir)
            .with_context(|| format!("could not create profile {}", dir.display()))?;

        debug!(profile = %dir.display(), "lane profile created");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for LaneProfile {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(profile = %self.dir.display(), "lane profile removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(profile = %self.dir.display(), "lane profile left behind: {e}"),
        }
    }
}
