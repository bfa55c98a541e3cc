//! Color-space conversions and adjustment used by the extractor and renderer.
//!
//! All channels are normalized `[0, 1]`; hue wraps in `[0, 1)` for 0°..360°.

use serde::{Deserialize, Serialize};

/// A color in HSL space, every component in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

/// Clamp a channel value to `[0, 1]`.
#[must_use]
pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Standard RGB to HSL conversion.
#[must_use]
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> Hsl {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    let d = max - min;
    if d <= f32::EPSILON {
        // Achromatic: hue is undefined, report zero.
        return Hsl { h: 0.0, s: 0.0, l };
    }

    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if max == r {
        ((g - b) / d + if g < b { 6.0 } else { 0.0 }) / 6.0
    } else if max == g {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    Hsl { h, s, l }
}

/// HSL back to RGB. Inverse of [`rgb_to_hsl`] up to floating-point noise.
#[must_use]
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    if s <= 0.0 {
        return [l, l, l];
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    [
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let mut t = t;
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Offsets applied to a palette color before it reaches the shader.
///
/// `hue_shift` is in degrees; the rest are additive/multiplicative in the
/// spaces named by each field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ColorAdjust {
    pub saturation: f32,
    pub lightness: f32,
    pub contrast: f32,
    pub hue_shift: f32,
}

/// Adjust a color: saturation/lightness/hue in HSL space, then contrast per
/// RGB channel. The HSL-before-contrast order is part of the visual contract;
/// do not reorder.
#[must_use]
pub fn adjust_color(rgb: [f32; 3], adjust: &ColorAdjust) -> [f32; 3] {
    let Hsl { h, s, l } = rgb_to_hsl(rgb[0], rgb[1], rgb[2]);

    let s = clamp01(s + adjust.saturation);
    let l = clamp01(l + adjust.lightness);
    let h = (h + adjust.hue_shift / 360.0).rem_euclid(1.0);

    let [r, g, b] = hsl_to_rgb(h, s, l);

    [
        clamp01((r - 0.5) * adjust.contrast + 0.5),
        clamp01((g - 0.5) * adjust.contrast + 0.5),
        clamp01((b - 0.5) * adjust.contrast + 0.5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_OP: ColorAdjust = ColorAdjust {
        saturation: 0.0,
        lightness: 0.0,
        contrast: 1.0,
        hue_shift: 0.0,
    };

    fn assert_round_trips(rgb: [f32; 3]) {
        let hsl = rgb_to_hsl(rgb[0], rgb[1], rgb[2]);
        let back = hsl_to_rgb(hsl.h, hsl.s, hsl.l);
        for c in 0..3 {
            assert!(
                (back[c] - rgb[c]).abs() < 1e-4,
                "channel {c} of {rgb:?} came back as {back:?}"
            );
        }
    }

    #[test]
    fn hsl_round_trips_reference_colors() {
        assert_round_trips([1.0, 0.0, 0.0]);
        assert_round_trips([0.5, 0.5, 0.5]);
        assert_round_trips([1.0, 1.0, 1.0]);
        assert_round_trips([0.2, 0.6, 0.9]);
    }

    #[test]
    fn pure_red_has_zero_hue_and_full_saturation() {
        let hsl = rgb_to_hsl(1.0, 0.0, 0.0);
        assert!(hsl.h.abs() < 1e-6);
        assert!((hsl.s - 1.0).abs() < 1e-6);
        assert!((hsl.l - 0.5).abs() < 1e-6);
    }

    #[test]
    fn gray_is_achromatic() {
        let hsl = rgb_to_hsl(0.5, 0.5, 0.5);
        assert_eq!(hsl.h, 0.0);
        assert_eq!(hsl.s, 0.0);
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp01(-0.3), 0.0);
        assert_eq!(clamp01(1.7), 1.0);
        assert_eq!(clamp01(0.42), 0.42);
    }

    #[test]
    fn identity_adjust_is_a_no_op() {
        let rgb = [0.2, 0.6, 0.9];
        let out = adjust_color(rgb, &NO_OP);
        for c in 0..3 {
            assert!((out[c] - rgb[c]).abs() < 1e-4);
        }
    }

    #[test]
    fn negative_hue_shift_wraps() {
        // Red shifted -90° must land at the same place as +270°.
        let a = adjust_color(
            [1.0, 0.0, 0.0],
            &ColorAdjust {
                hue_shift: -90.0,
                ..NO_OP
            },
        );
        let b = adjust_color(
            [1.0, 0.0, 0.0],
            &ColorAdjust {
                hue_shift: 270.0,
                ..NO_OP
            },
        );
        for c in 0..3 {
            assert!((a[c] - b[c]).abs() < 1e-4);
        }
    }

    #[test]
    fn contrast_applies_after_hsl_adjustment() {
        // Lightness first lifts 0.5 gray to 0.7, then contrast 2.0 pushes the
        // RGB channels to 0.9. Contrast-before-lightness would give 0.7.
        let out = adjust_color(
            [0.5, 0.5, 0.5],
            &ColorAdjust {
                lightness: 0.2,
                contrast: 2.0,
                ..NO_OP
            },
        );
        for c in 0..3 {
            assert!((out[c] - 0.9).abs() < 1e-4, "got {out:?}");
        }
    }

    #[test]
    fn saturation_offset_clamps() {
        let out = adjust_color(
            [1.0, 0.0, 0.0],
            &ColorAdjust {
                saturation: 0.8,
                ..NO_OP
            },
        );
        // Already fully saturated red stays red.
        assert!((out[0] - 1.0).abs() < 1e-4);
        assert!(out[1].abs() < 1e-4);
        assert!(out[2].abs() < 1e-4);
    }
}
