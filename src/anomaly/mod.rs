//! Anomaly Detector
//!
//! Flags captures that look like an anti-bot challenge page instead of a
//! lesson: a small block of brand-red UI elements on top of a mostly white
//! centre. Pure pixel statistics, no model. False positives and negatives
//! are possible.
//!
//! Colour handling follows the usual 8-bit HSV convention (hue 0-180,
//! saturation and value 0-255) so thresholds read the same as in common
//! image tooling.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::store::{ArtifactStore, ErrorEntry, ErrorLog, StoreError};

/// Error log message written for quarantined artifacts
pub const QUARANTINE_MESSAGE: &str = "anomaly: bot challenge detected";

#[derive(Debug, thiserror::Error)]
pub enum AnomalyError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("detector task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// Verdict needs strictly more red pixels than this
    pub red_pixel_min: usize,
    /// ...and strictly more bright centre pixels than this
    pub white_pixel_min: usize,
    /// Grey level above which a pixel counts as white
    pub white_level: u8,
    /// Half extents of the centre window
    pub center_half_width: u32,
    pub center_half_height: u32,
    pub saturation_min: u8,
    pub value_min: u8,
    /// Red hue wraps around 0: [0, low_max] and [high_min, 180]
    pub red_hue_low_max: u8,
    pub red_hue_high_min: u8,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            red_pixel_min: 100,
            white_pixel_min: 10_000,
            white_level: 220,
            center_half_width: 150,
            center_half_height: 100,
            saturation_min: 100,
            value_min: 100,
            red_hue_low_max: 10,
            red_hue_high_min: 170,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelStats {
    pub width: u32,
    pub height: u32,
    pub red_pixels: usize,
    pub center_white_pixels: usize,
}

/// 8-bit HSV: hue in [0, 180], saturation and value in [0, 255]
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    (
        (hue / 2.0).round() as u8,
        saturation.round() as u8,
        max as u8,
    )
}

fn grey_level(r: u8, g: u8, b: u8) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    #[must_use]
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    #[must_use]
    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    #[must_use]
    pub fn analyze_image(&self, image: &DynamicImage) -> PixelStats {
        self.analyze_rgb(&image.to_rgb8())
    }

    #[must_use]
    pub fn analyze_rgb(&self, rgb: &RgbImage) -> PixelStats {
        let t = &self.thresholds;
        let (width, height) = rgb.dimensions();
        let (cx, cy) = (width / 2, height / 2);
        let x_range = cx.saturating_sub(t.center_half_width)..(cx + t.center_half_width).min(width);
        let y_range = cy.saturating_sub(t.center_half_height)..(cy + t.center_half_height).min(height);

        let mut stats = PixelStats {
            width,
            height,
            ..PixelStats::default()
        };

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let [r, g, b] = pixel.0;

            let (h, s, v) = rgb_to_hsv(r, g, b);
            let red_hue = h <= t.red_hue_low_max || h >= t.red_hue_high_min;
            if red_hue && s >= t.saturation_min && v >= t.value_min {
                stats.red_pixels += 1;
            }

            if x_range.contains(&x)
                && y_range.contains(&y)
                && grey_level(r, g, b) > f32::from(t.white_level)
            {
                stats.center_white_pixels += 1;
            }
        }

        stats
    }

    #[must_use]
    pub fn looks_like_challenge(&self, stats: &PixelStats) -> bool {
        stats.red_pixels > self.thresholds.red_pixel_min
            && stats.center_white_pixels > self.thresholds.white_pixel_min
    }

    /// Decode and classify a file on the calling thread
    pub fn inspect_file(&self, path: &Path) -> Result<(bool, PixelStats), AnomalyError> {
        let image = image::open(path).map_err(|source| AnomalyError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let stats = self.analyze_image(&image);
        Ok((self.looks_like_challenge(&stats), stats))
    }

    /// [`inspect_file`](Self::inspect_file) on the blocking pool
    pub async fn inspect(&self, path: &Path) -> Result<(bool, PixelStats), AnomalyError> {
        let detector = self.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || detector.inspect_file(&path)).await?
    }

    /// Inspect the `limit` most recently modified artifacts and return the
    /// flagged ones. Undecodable files are logged and skipped.
    pub async fn scan_recent(
        &self,
        store: &ArtifactStore,
        limit: usize,
    ) -> Result<Vec<(i64, PathBuf, PixelStats)>, AnomalyError> {
        let mut flagged = Vec::new();

        for (id, path) in store.recent_artifacts(limit).await? {
            match self.inspect(&path).await {
                Ok((true, stats)) => flagged.push((id, path, stats)),
                Ok((false, stats)) => debug!("Artifact {id} looks clean: {stats:?}"),
                Err(e) => debug!("Skipping artifact {id}: {e}"),
            }
        }

        Ok(flagged)
    }
}

/// Rename the artifact to the quarantine name and record an error entry so
/// `--skip-errors` runs leave the id alone.
pub async fn quarantine_artifact(
    store: &ArtifactStore,
    error_log: &ErrorLog,
    id: i64,
    artifact: &Path,
    target_url: &str,
) -> Result<PathBuf, StoreError> {
    let quarantined = store.quarantine(artifact).await?;
    error_log
        .append(&ErrorEntry::new(id, target_url, QUARANTINE_MESSAGE))
        .await?;
    info!("Item {id} quarantined as {}", quarantined.display());
    Ok(quarantined)
}
