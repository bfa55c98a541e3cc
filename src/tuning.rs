//! Live-tunable visual parameters and the watch channel that carries them
//! from the debug surface into the extractor and renderer.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::color::ColorAdjust;
use crate::palette::WeightMultipliers;

/// The debug parameter bundle: everything the preview lets you nudge live.
/// Defaults are the production values of the detail-page backdrop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TuningParams {
    #[serde(default = "TuningParams::default_blur")]
    pub blur: f32,
    #[serde(default = "TuningParams::default_saturation")]
    pub saturation: f32,
    #[serde(default = "TuningParams::default_lightness")]
    pub lightness: f32,
    #[serde(default = "TuningParams::default_contrast")]
    pub contrast: f32,
    #[serde(default)]
    pub hue_shift: f32,
    #[serde(default = "TuningParams::default_time_scale")]
    pub time_scale: f32,
    #[serde(default = "TuningParams::default_noise_scale1")]
    pub noise_scale1: f32,
    #[serde(default = "TuningParams::default_noise_scale2")]
    pub noise_scale2: f32,
    #[serde(default = "TuningParams::default_distortion")]
    pub distortion: f32,
    #[serde(default)]
    pub weight_multipliers: WeightMultipliers,
}

impl TuningParams {
    const fn default_blur() -> f32 {
        0.289
    }

    const fn default_saturation() -> f32 {
        0.5
    }

    const fn default_lightness() -> f32 {
        0.15
    }

    const fn default_contrast() -> f32 {
        1.0
    }

    const fn default_time_scale() -> f32 {
        0.153
    }

    const fn default_noise_scale1() -> f32 {
        0.5
    }

    const fn default_noise_scale2() -> f32 {
        1.0
    }

    const fn default_distortion() -> f32 {
        0.2
    }

    /// The color-adjustment slice of the bundle, fed to `adjust_color`.
    #[must_use]
    pub fn color_adjust(&self) -> ColorAdjust {
        ColorAdjust {
            saturation: self.saturation,
            lightness: self.lightness,
            contrast: self.contrast,
            hue_shift: self.hue_shift,
        }
    }
}

impl Default for TuningParams {
    fn default() -> Self {
        Self {
            blur: Self::default_blur(),
            saturation: Self::default_saturation(),
            lightness: Self::default_lightness(),
            contrast: Self::default_contrast(),
            hue_shift: 0.0,
            time_scale: Self::default_time_scale(),
            noise_scale1: Self::default_noise_scale1(),
            noise_scale2: Self::default_noise_scale2(),
            distortion: Self::default_distortion(),
            weight_multipliers: WeightMultipliers::default(),
        }
    }
}

/// Write side of the tuning channel. The extractor task and the render loop
/// hold receivers; every update lands on their next extraction/frame.
#[derive(Debug, Clone)]
pub struct TuningHandle {
    tx: watch::Sender<TuningParams>,
}

impl TuningHandle {
    #[must_use]
    pub fn new(initial: TuningParams) -> (Self, watch::Receiver<TuningParams>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TuningParams> {
        self.tx.subscribe()
    }

    /// Apply a mutation and notify all subscribers.
    pub fn update(&self, apply: impl FnOnce(&mut TuningParams)) {
        self.tx.send_modify(apply);
    }

    pub fn reset(&self) {
        self.tx.send_replace(TuningParams::default());
    }

    #[must_use]
    pub fn current(&self) -> TuningParams {
        *self.tx.borrow()
    }
}
