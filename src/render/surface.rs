//! Headless animated gradient surface.
//!
//! Rasterizes the gradient field into an RGBA8 buffer frame by frame. Used by
//! the headless mode and anywhere a windowed swapchain is unavailable; the
//! windowed preview drives the same field through the GPU instead.

use std::time::Duration;

use anyhow::anyhow;
use tracing::debug;

use crate::color::adjust_color;
use crate::error::Error;
use crate::palette::{PALETTE_SIZE, Palette};
use crate::tuning::TuningParams;

use super::clock::AnimationClock;
use super::field::FieldSampler;

/// Renderer lifecycle. `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Initializing,
    Running,
    Paused,
    Disposed,
}

/// One animated backdrop instance for a fixed palette. Dimensions may change
/// over its life; a new palette means a new instance.
#[derive(Debug)]
pub struct GradientSurface {
    state: SurfaceState,
    palette: Palette,
    clock: AnimationClock,
    sampler: FieldSampler,
    width: u32,
    height: u32,
    frame: Vec<u8>,
}

impl GradientSurface {
    /// Build a surface for `palette` at the given pixel dimensions.
    ///
    /// # Errors
    /// Returns [`Error::Render`] when either dimension is zero.
    pub fn new(
        palette: &Palette,
        width: u32,
        height: u32,
        tuning: &TuningParams,
    ) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::Render(anyhow!(
                "gradient surface needs non-zero dimensions, got {width}x{height}"
            )));
        }
        Ok(Self {
            state: SurfaceState::Initializing,
            palette: palette.clone(),
            clock: AnimationClock::new(tuning.time_scale),
            sampler: build_sampler(palette, tuning),
            width,
            height,
            frame: vec![0; (width * height * 4) as usize],
        })
    }

    #[must_use]
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Accumulated animation time in seconds (already time-scaled).
    #[must_use]
    pub fn time(&self) -> f32 {
        self.clock.time()
    }

    /// Pause or resume time advancement. Hidden time never reaches the field.
    pub fn set_visible(&mut self, visible: bool) {
        match (self.state, visible) {
            (SurfaceState::Disposed, _) => {}
            (SurfaceState::Running, false) => self.state = SurfaceState::Paused,
            (SurfaceState::Paused, true) => self.state = SurfaceState::Running,
            _ => {}
        }
        self.clock.set_visible(visible);
    }

    /// Advance one frame. Returns the freshly rendered frame, or `None` when
    /// paused (the previous frame stays valid) or disposed.
    pub fn tick(&mut self, delta: Duration) -> Option<&[u8]> {
        match self.state {
            SurfaceState::Disposed => return None,
            SurfaceState::Initializing => {
                self.state = SurfaceState::Running;
            }
            SurfaceState::Paused => {
                self.clock.tick(delta);
                return None;
            }
            SurfaceState::Running => {}
        }
        let t = self.clock.tick(delta);
        self.render(t);
        Some(&self.frame)
    }

    /// Change output resolution in place. Palette and accumulated time are
    /// untouched; the next tick renders at the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.state == SurfaceState::Disposed || width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.frame = vec![0; (width * height * 4) as usize];
    }

    /// Re-apply a changed parameter bundle without losing animation state.
    pub fn set_tuning(&mut self, tuning: &TuningParams) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        self.clock.set_time_scale(tuning.time_scale);
        self.sampler = build_sampler(&self.palette, tuning);
    }

    /// Release the frame buffer and enter the terminal state. Idempotent;
    /// later ticks and resizes are no-ops.
    pub fn dispose(&mut self) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        debug!("disposing gradient surface");
        self.state = SurfaceState::Disposed;
        self.frame = Vec::new();
    }

    /// The most recently rendered frame, if any.
    #[must_use]
    pub fn frame(&self) -> Option<&[u8]> {
        if self.state == SurfaceState::Disposed || self.frame.is_empty() {
            None
        } else {
            Some(&self.frame)
        }
    }

    fn render(&mut self, t: f32) {
        let w = self.width as f32;
        let h = self.height as f32;
        for y in 0..self.height {
            for x in 0..self.width {
                let u = (x as f32 + 0.5) / w;
                let v = (y as f32 + 0.5) / h;
                let rgb = self.sampler.shade(u, v, t);
                let base = ((y * self.width + x) * 4) as usize;
                self.frame[base] = (rgb[0] * 255.0).round() as u8;
                self.frame[base + 1] = (rgb[1] * 255.0).round() as u8;
                self.frame[base + 2] = (rgb[2] * 255.0).round() as u8;
                self.frame[base + 3] = 255;
            }
        }
    }
}

/// Adjust the palette colors per the current tuning and pair them with their
/// weights for band layout.
pub(crate) fn build_sampler(palette: &Palette, tuning: &TuningParams) -> FieldSampler {
    let adjust = tuning.color_adjust();
    let mut colors = [[0.0f32; 3]; PALETTE_SIZE];
    let mut weights = [0.0f32; PALETTE_SIZE];
    for (i, entry) in palette.iter().enumerate() {
        colors[i] = adjust_color(entry.base_rgb, &adjust);
        weights[i] = entry.weight;
    }
    FieldSampler::new(
        colors,
        weights,
        tuning.blur,
        tuning.noise_scale1,
        tuning.noise_scale2,
        tuning.distortion,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ExtractedColor;

    const FRAME: Duration = Duration::from_millis(50);

    fn palette() -> Palette {
        let entry = |rgb, weight| ExtractedColor {
            base_rgb: rgb,
            weight,
            score: 0.0,
            is_neutral: false,
        };
        [
            entry([1.0, 1.0, 1.0], 0.2),
            entry([0.9, 0.3, 0.2], 0.3),
            entry([0.2, 0.5, 0.9], 0.3),
            entry([0.1, 0.1, 0.2], 0.2),
        ]
    }

    fn surface() -> GradientSurface {
        GradientSurface::new(&palette(), 16, 8, &TuningParams::default()).unwrap()
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let err = GradientSurface::new(&palette(), 0, 8, &TuningParams::default());
        assert!(matches!(err, Err(Error::Render(_))));
    }

    #[test]
    fn first_tick_starts_running_and_renders() {
        let mut s = surface();
        assert_eq!(s.state(), SurfaceState::Initializing);
        let frame = s.tick(FRAME).expect("frame");
        assert_eq!(frame.len(), 16 * 8 * 4);
        assert_eq!(s.state(), SurfaceState::Running);
        // Alpha is opaque everywhere.
        assert!(s.frame().unwrap().chunks(4).all(|px| px[3] == 255));
    }

    #[test]
    fn hidden_time_is_not_accumulated() {
        let mut s = surface();
        s.tick(FRAME);
        let visible_time = s.time();

        s.set_visible(false);
        assert_eq!(s.state(), SurfaceState::Paused);
        for _ in 0..20 {
            assert!(s.tick(FRAME).is_none());
        }
        assert_eq!(s.time(), visible_time);

        s.set_visible(true);
        assert_eq!(s.state(), SurfaceState::Running);
        s.tick(FRAME);
        let expected = visible_time + FRAME.as_secs_f32() * TuningParams::default().time_scale;
        assert!((s.time() - expected).abs() < 1e-6);
    }

    #[test]
    fn paused_surface_keeps_its_last_frame() {
        let mut s = surface();
        s.tick(FRAME);
        let before = s.frame().unwrap().to_vec();
        s.set_visible(false);
        s.tick(FRAME);
        assert_eq!(s.frame().unwrap(), before.as_slice());
    }

    #[test]
    fn resize_keeps_palette_and_time() {
        let mut s = surface();
        s.tick(FRAME);
        let time_before = s.time();

        s.resize(8, 4);
        assert_eq!(s.dimensions(), (8, 4));
        assert_eq!(s.time(), time_before);
        let frame = s.tick(FRAME).expect("frame after resize");
        assert_eq!(frame.len(), 8 * 4 * 4);
    }

    #[test]
    fn dispose_is_terminal_and_idempotent() {
        let mut s = surface();
        s.tick(FRAME);
        s.dispose();
        assert_eq!(s.state(), SurfaceState::Disposed);
        assert!(s.frame().is_none());

        // Feeding frames, resizing, or disposing again must not panic.
        assert!(s.tick(FRAME).is_none());
        s.resize(32, 32);
        s.set_visible(true);
        s.dispose();
        assert_eq!(s.state(), SurfaceState::Disposed);
        assert!(s.frame().is_none());
    }

    #[test]
    fn tuning_change_applies_without_resetting_time() {
        let mut s = surface();
        s.tick(FRAME);
        let time_before = s.time();
        let frame_before = s.frame().unwrap().to_vec();

        let mut tuning = TuningParams::default();
        tuning.lightness = 0.5;
        tuning.time_scale = 0.0;
        s.set_tuning(&tuning);
        assert_eq!(s.time(), time_before);

        let frame_after = s.tick(FRAME).unwrap().to_vec();
        assert_ne!(frame_before, frame_after);
        // time_scale 0 freezes the clock.
        assert_eq!(s.time(), time_before);
    }
}
