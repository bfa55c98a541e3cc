//! YAML settings for the backdrop pipeline and preview.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::error::Error;
use crate::palette::ExtractionParams;
use crate::palette::cache::DEFAULT_CAPACITY;
use crate::tuning::TuningParams;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Thresholds for the extractor's filter stage.
    #[serde(default)]
    pub extraction: ExtractionParams,

    /// Initial values for the live parameter bundle.
    #[serde(default)]
    pub tuning: TuningParams,

    /// Maximum number of memoized palettes.
    #[serde(default = "Settings::default_cache_capacity")]
    pub cache_capacity: usize,

    /// Image used when the requested one fails to decode.
    #[serde(default)]
    pub fallback_image: Option<PathBuf>,

    /// Frame pacing for the headless ticker.
    #[serde(with = "humantime_serde", default = "Settings::default_target_frame_time")]
    pub target_frame_time: Duration,
}

impl Settings {
    const fn default_cache_capacity() -> usize {
        DEFAULT_CAPACITY
    }

    const fn default_target_frame_time() -> Duration {
        Duration::from_millis(16)
    }

    /// Load settings from a YAML file.
    ///
    /// # Errors
    /// [`Error::Io`] when the file cannot be read, [`Error::Config`] when it
    /// does not parse.
    pub fn from_yaml_file(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Range-check everything a config file can get wrong.
    pub fn validate(&self) -> Result<()> {
        let e = &self.extraction;
        for (name, value) in [
            ("extraction.min-lightness", e.min_lightness),
            ("extraction.muddy-threshold", e.muddy_threshold),
            ("extraction.accent-threshold", e.accent_threshold),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be within [0, 1], got {value}"
            );
        }

        let t = &self.tuning;
        ensure!(t.blur >= 0.0, "tuning.blur must not be negative");
        ensure!(t.contrast > 0.0, "tuning.contrast must be positive");
        ensure!(t.time_scale >= 0.0, "tuning.time-scale must not be negative");
        ensure!(
            t.noise_scale1 > 0.0 && t.noise_scale2 > 0.0,
            "tuning noise scales must be positive"
        );
        for (i, m) in t.weight_multipliers.0.iter().enumerate() {
            ensure!(
                *m >= 0.0,
                "tuning.weight-multipliers[{i}] must not be negative"
            );
        }

        ensure!(self.cache_capacity >= 1, "cache-capacity must be at least 1");
        ensure!(
            self.target_frame_time > Duration::ZERO && self.target_frame_time <= Duration::from_secs(1),
            "target-frame-time must be within (0, 1s]"
        );
        if let Some(path) = &self.fallback_image {
            ensure!(
                path.is_file(),
                "fallback-image {} is not a readable file",
                path.display()
            );
        }
        Ok(())
    }

    /// Load from an optional path: missing means built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let settings = Self::from_yaml_file(p)
                    .with_context(|| format!("loading settings from {}", p.display()))?;
                Ok(settings)
            }
            None => Ok(Self::default()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extraction: ExtractionParams::default(),
            tuning: TuningParams::default(),
            cache_capacity: Self::default_cache_capacity(),
            fallback_image: None,
            target_frame_time: Self::default_target_frame_time(),
        }
    }
}
