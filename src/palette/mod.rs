//! Palette extraction: from a product image to exactly four weighted colors.

pub mod cache;
pub mod extract;
pub mod loader;
pub mod quantize;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Upper bound on raw colors requested from the quantizer.
pub const RAW_PALETTE_SIZE: usize = 20;

/// A finished palette always carries exactly this many entries.
pub const PALETTE_SIZE: usize = 4;

/// File name of the catalog's stand-in product shot. References ending in
/// this name are recognized without any pixel work.
pub const DEFAULT_IMAGE_FILENAME: &str = "lure_main_default.webp";

/// One entry of a finished palette.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedColor {
    /// Normalized RGB channels in `[0, 1]`.
    pub base_rgb: [f32; 3],
    /// Relative visual prominence; a finished palette's weights sum to 1.0.
    pub weight: f32,
    /// Ranking value used during selection only.
    pub score: f32,
    /// Near-gray flag (saturation below 0.1).
    pub is_neutral: bool,
}

impl ExtractedColor {
    /// Synthetic white entry used to pad short results.
    #[must_use]
    pub fn synthetic_white() -> Self {
        Self {
            base_rgb: [1.0, 1.0, 1.0],
            weight: 0.05,
            score: -1.0,
            is_neutral: true,
        }
    }
}

/// The finished set of exactly four weighted representative colors,
/// sorted by lightness descending (brightest first).
pub type Palette = [ExtractedColor; PALETTE_SIZE];

/// Thresholds steering candidate filtering and scoring.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractionParams {
    /// Colors darker than this are discarded outright.
    #[serde(default = "ExtractionParams::default_min_lightness")]
    pub min_lightness: f32,
    /// Low-saturation midtones below this are discarded as muddy.
    #[serde(default = "ExtractionParams::default_muddy_threshold")]
    pub muddy_threshold: f32,
    /// Saturation above this (with enough lightness) marks a vivid accent.
    #[serde(default = "ExtractionParams::default_accent_threshold")]
    pub accent_threshold: f32,
}

impl ExtractionParams {
    const fn default_min_lightness() -> f32 {
        0.2
    }

    const fn default_muddy_threshold() -> f32 {
        0.25
    }

    const fn default_accent_threshold() -> f32 {
        0.5
    }
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            min_lightness: Self::default_min_lightness(),
            muddy_threshold: Self::default_muddy_threshold(),
            accent_threshold: Self::default_accent_threshold(),
        }
    }
}

/// Positional weight multipliers over the final brightest-to-darkest order.
/// The defaults emphasize the two middle tones over the extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightMultipliers(pub [f32; PALETTE_SIZE]);

impl Default for WeightMultipliers {
    fn default() -> Self {
        Self([0.7, 1.5, 1.5, 0.7])
    }
}

/// A resolvable image reference. The catalog hands the pipeline local paths;
/// the storage/proxy layers in front of them are somebody else's problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(PathBuf);

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// True when this reference points at the recognized placeholder shot.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(DEFAULT_IMAGE_FILENAME))
    }
}

impl From<&Path> for ImageRef {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}
