//! The extraction pipeline: quantize, weight by coverage, filter and score,
//! then pick four perceptually diverse colors.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::{debug, info};

use crate::color::{Hsl, hsl_to_rgb, rgb_to_hsl};
use crate::error::Error;

use super::cache::{CacheKey, PaletteCache};
use super::{
    ExtractedColor, ExtractionParams, ImageRef, PALETTE_SIZE, Palette, RAW_PALETTE_SIZE,
    WeightMultipliers, loader, quantize,
};

/// Side length of the coverage sampling grid.
const SAMPLE_GRID: u32 = 50;

/// Minimum pairwise RGB distance between selected colors, and the relaxed
/// threshold used when the strict pass comes up short.
const MIN_RGB_DISTANCE: f32 = 0.15;
const RELAXED_RGB_DISTANCE: f32 = 0.08;

/// Hues closer than this (wrapped) count as the same family when deciding
/// whether a near-duplicate should replace an earlier pick.
const MIN_HUE_DISTANCE: f32 = 0.08;

/// Palette extraction service. Owns the cache; cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Extractor {
    cache: Mutex<PaletteCache>,
    fallback: Option<PathBuf>,
    extractions: AtomicU64,
}

impl Extractor {
    #[must_use]
    pub fn new(cache: PaletteCache, fallback: Option<PathBuf>) -> Self {
        Self {
            cache: Mutex::new(cache),
            fallback,
            extractions: AtomicU64::new(0),
        }
    }

    /// Extract the weighted 4-color palette for `image`.
    ///
    /// Returns `Ok(None)` for the recognized placeholder image without doing
    /// any pixel work. Results are cached per image+thresholds; the weight
    /// multipliers are applied on the way out so they can change between
    /// calls without re-extracting.
    ///
    /// # Errors
    /// [`Error::ImageLoad`] when neither the image nor the fallback decodes;
    /// [`Error::Extraction`] when quantization yields no usable colors.
    pub async fn extract(
        &self,
        image: &ImageRef,
        params: &ExtractionParams,
        multipliers: &WeightMultipliers,
    ) -> Result<Option<Palette>, Error> {
        if image.is_default() {
            debug!(image = %image.path().display(), "placeholder image, skipping extraction");
            return Ok(None);
        }

        let key = CacheKey::new(image, params);
        let cached = self.lock_cache().get(&key).cloned();
        if let Some(palette) = cached {
            debug!(image = %image.path().display(), "palette cache hit");
            return Ok(Some(finalize_weights(palette, multipliers)));
        }

        let rgba = loader::load_with_fallback(image.path(), self.fallback.as_deref()).await?;
        self.extractions.fetch_add(1, Ordering::Relaxed);
        let palette = build_palette(&rgba, params)?;
        info!(image = %image.path().display(), "extracted palette");

        self.lock_cache().set(key, palette.clone());
        Ok(Some(finalize_weights(palette, multipliers)))
    }

    /// Number of full extractions performed (cache hits excluded).
    #[must_use]
    pub fn extractions_performed(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    #[must_use]
    pub fn cached_palettes(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, PaletteCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Run the pixel pipeline on a decoded image. The cached value keeps the raw
/// coverage weights; multipliers and normalization happen in
/// [`finalize_weights`].
fn build_palette(image: &RgbaImage, params: &ExtractionParams) -> Result<Palette, Error> {
    let raw = quantize::quantize(image, RAW_PALETTE_SIZE);
    if raw.is_empty() {
        return Err(Error::Extraction("quantizer returned no colors".into()));
    }

    let weights = coverage_weights(image, &raw);
    let mut candidates = score_candidates(&raw, &weights, params);

    while candidates.len() < PALETTE_SIZE {
        candidates.push(ExtractedColor::synthetic_white());
    }
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selected = select_diverse(&candidates);
    while selected.len() < PALETTE_SIZE {
        selected.push(ExtractedColor::synthetic_white());
    }
    selected.sort_by(|a, b| {
        let la = rgb_to_hsl(a.base_rgb[0], a.base_rgb[1], a.base_rgb[2]).l;
        let lb = rgb_to_hsl(b.base_rgb[0], b.base_rgb[1], b.base_rgb[2]).l;
        lb.total_cmp(&la)
    });

    Palette::try_from(selected)
        .map_err(|_| Error::Extraction("diversity selection produced a short palette".into()))
}

/// Fraction of sample-grid pixels nearest to each raw color.
fn coverage_weights(image: &RgbaImage, raw: &[[f32; 3]]) -> Vec<f32> {
    let small = imageops::resize(image, SAMPLE_GRID, SAMPLE_GRID, FilterType::Triangle);
    let mut counts = vec![0u32; raw.len()];

    for px in small.pixels() {
        let p = [
            f32::from(px[0]) / 255.0,
            f32::from(px[1]) / 255.0,
            f32::from(px[2]) / 255.0,
        ];
        let mut best = 0usize;
        let mut best_dist = f32::MAX;
        for (idx, color) in raw.iter().enumerate() {
            let dist = squared_distance(&p, color);
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        counts[best] += 1;
    }

    let total = (SAMPLE_GRID * SAMPLE_GRID) as f32;
    counts.iter().map(|&c| c as f32 / total).collect()
}

/// Filter and score raw colors. Order of the rules is behaviorally
/// significant; see each branch.
fn score_candidates(
    raw: &[[f32; 3]],
    weights: &[f32],
    params: &ExtractionParams,
) -> Vec<ExtractedColor> {
    raw.iter()
        .zip(weights)
        .filter_map(|(rgb, &weight)| {
            let [mut r, mut g, mut b] = *rgb;
            let Hsl { h, mut s, mut l } = rgb_to_hsl(r, g, b);

            // Too dark to contribute to a backdrop.
            if l < params.min_lightness {
                return None;
            }
            // Muddy midtones: low saturation at medium lightness.
            if l > params.min_lightness && l < 0.85 && s < params.muddy_threshold {
                return None;
            }

            let mut score = weight;

            // Near-white collapses to pure white and always ranks high.
            if l > 0.85 {
                score += 2.0;
                r = 1.0;
                g = 1.0;
                b = 1.0;
                l = 1.0;
                s = 0.0;
            }

            if s > params.accent_threshold && l > 0.3 {
                score += 5.0;
            } else if s > 0.3 {
                score *= 1.0 + s * 3.0;
            }

            // Red hue correction: quantization tends to wash reds toward
            // orange/magenta, so pin near-red hues to exact red and floor the
            // saturation. Deliberately permanent.
            if (h < 0.06 || h > 0.95) && s > 0.3 {
                s = s.max(0.8);
                [r, g, b] = hsl_to_rgb(0.0, s, l);
            }

            Some(ExtractedColor {
                base_rgb: [r, g, b],
                weight,
                score,
                is_neutral: s < 0.1,
            })
        })
        .collect()
}

/// Greedy diversity selection over score-sorted candidates. A candidate too
/// close to an earlier pick replaces it only when their hues are in the same
/// family and the candidate is more saturated (then lighter, on ties). A
/// relaxed second pass runs if the strict pass selects fewer than four.
fn select_diverse(candidates: &[ExtractedColor]) -> Vec<ExtractedColor> {
    let selected = scan(candidates, Vec::new(), MIN_RGB_DISTANCE);
    if selected.len() < PALETTE_SIZE {
        return scan(candidates, selected, RELAXED_RGB_DISTANCE);
    }
    selected
}

fn scan(
    candidates: &[ExtractedColor],
    mut selected: Vec<ExtractedColor>,
    min_distance: f32,
) -> Vec<ExtractedColor> {
    for candidate in candidates {
        if selected.len() >= PALETTE_SIZE {
            break;
        }
        if selected.iter().any(|s| s.base_rgb == candidate.base_rgb) {
            continue;
        }
        let too_close = selected
            .iter()
            .position(|s| rgb_distance(&s.base_rgb, &candidate.base_rgb) < min_distance);
        match too_close {
            None => selected.push(candidate.clone()),
            Some(idx) => {
                if hue_distance(&selected[idx].base_rgb, &candidate.base_rgb) < MIN_HUE_DISTANCE
                    && prefers(candidate, &selected[idx])
                {
                    selected[idx] = candidate.clone();
                }
            }
        }
    }
    selected
}

/// Higher saturation wins; lightness breaks the tie.
fn prefers(candidate: &ExtractedColor, existing: &ExtractedColor) -> bool {
    let a = rgb_to_hsl(candidate.base_rgb[0], candidate.base_rgb[1], candidate.base_rgb[2]);
    let b = rgb_to_hsl(existing.base_rgb[0], existing.base_rgb[1], existing.base_rgb[2]);
    if (a.s - b.s).abs() > f32::EPSILON {
        a.s > b.s
    } else {
        a.l > b.l
    }
}

fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn rgb_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    squared_distance(a, b).sqrt()
}

fn hue_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let ha = rgb_to_hsl(a[0], a[1], a[2]).h;
    let hb = rgb_to_hsl(b[0], b[1], b[2]).h;
    let d = (ha - hb).abs();
    d.min(1.0 - d)
}

/// Apply positional multipliers over the brightest-to-darkest order, then
/// renormalize to sum 1.0; all-zero weights fall back to a uniform split.
fn finalize_weights(mut palette: Palette, multipliers: &WeightMultipliers) -> Palette {
    for (entry, &m) in palette.iter_mut().zip(multipliers.0.iter()) {
        entry.weight *= m;
    }
    let total: f32 = palette.iter().map(|c| c.weight).sum();
    if total > 0.0 {
        for entry in &mut palette {
            entry.weight /= total;
        }
    } else {
        for entry in &mut palette {
            entry.weight = 1.0 / PALETTE_SIZE as f32;
        }
    }
    palette
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(rgb: [f32; 3], score: f32) -> ExtractedColor {
        ExtractedColor {
            base_rgb: rgb,
            weight: 0.25,
            score,
            is_neutral: false,
        }
    }

    #[test]
    fn dark_colors_are_discarded() {
        let params = ExtractionParams::default();
        let out = score_candidates(&[[0.1, 0.1, 0.1]], &[1.0], &params);
        assert!(out.is_empty());
    }

    #[test]
    fn muddy_midtones_are_discarded() {
        let params = ExtractionParams::default();
        // l = 0.5, s = 0: classic muddy gray.
        let out = score_candidates(&[[0.5, 0.5, 0.5]], &[1.0], &params);
        assert!(out.is_empty());
    }

    #[test]
    fn near_white_is_forced_to_pure_white_with_bonus() {
        let params = ExtractionParams::default();
        let out = score_candidates(&[[0.95, 0.93, 0.91]], &[0.4], &params);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].base_rgb, [1.0, 1.0, 1.0]);
        assert!((out[0].score - 2.4).abs() < 1e-5);
        assert!(out[0].is_neutral);
    }

    #[test]
    fn vivid_accent_gets_flat_bonus() {
        let params = ExtractionParams::default();
        // h=0.33 (green), s=0.6, l=0.5.
        let rgb = hsl_to_rgb(0.33, 0.6, 0.5);
        let out = score_candidates(&[rgb], &[0.1], &params);
        assert_eq!(out.len(), 1);
        assert!((out[0].score - 5.1).abs() < 1e-3);
    }

    #[test]
    fn moderate_saturation_gets_proportional_boost() {
        let params = ExtractionParams::default();
        let rgb = hsl_to_rgb(0.6, 0.4, 0.5);
        let out = score_candidates(&[rgb], &[0.2], &params);
        assert_eq!(out.len(), 1);
        // weight * (1 + s*3) = 0.2 * 2.2
        assert!((out[0].score - 0.44).abs() < 1e-2);
    }

    #[test]
    fn near_red_hue_is_pinned_to_exact_red() {
        let params = ExtractionParams::default();
        let rgb = hsl_to_rgb(0.97, 0.5, 0.5);
        let out = score_candidates(&[rgb], &[0.2], &params);
        assert_eq!(out.len(), 1);
        let hsl = rgb_to_hsl(out[0].base_rgb[0], out[0].base_rgb[1], out[0].base_rgb[2]);
        assert!(hsl.h.abs() < 1e-3, "hue not pinned: {hsl:?}");
        assert!(hsl.s >= 0.8 - 1e-3, "saturation not floored: {hsl:?}");
        assert!(!out[0].is_neutral);
    }

    #[test]
    fn diversity_keeps_the_more_saturated_of_two_near_reds() {
        // red_b outranks red_a on score, but red_a is more saturated and the
        // two are near-identical, so red_a must replace it.
        let red_b = color([0.88, 0.12, 0.12], 5.0);
        let red_a = color([0.9, 0.1, 0.1], 4.0);
        let green = color([0.1, 0.8, 0.2], 3.0);
        let selected = select_diverse(&[red_b.clone(), red_a.clone(), green.clone()]);

        assert!(selected.iter().any(|c| c.base_rgb == red_a.base_rgb));
        assert!(!selected.iter().any(|c| c.base_rgb == red_b.base_rgb));
        assert!(selected.iter().any(|c| c.base_rgb == green.base_rgb));
    }

    #[test]
    fn distant_hues_do_not_replace_each_other() {
        // Blue and a nearby purple-ish color within RGB distance but with
        // hues far apart: the earlier pick stays, the candidate is skipped.
        let blue = color(hsl_to_rgb(0.66, 0.8, 0.5), 5.0);
        let cyan = color(hsl_to_rgb(0.5, 0.9, 0.5), 4.0);
        let selected = scan(&[blue.clone(), cyan.clone()], Vec::new(), 2.0);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].base_rgb, blue.base_rgb);
    }

    #[test]
    fn exact_duplicates_are_skipped() {
        let white = color([1.0, 1.0, 1.0], 2.0);
        let selected = select_diverse(&[white.clone(), white.clone(), white.clone()]);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn relaxed_pass_admits_closer_colors() {
        // Distance ~0.12: rejected at 0.15, admitted at 0.08.
        let a = color([0.2, 0.4, 0.8], 5.0);
        let b = color([0.2, 0.4, 0.68], 4.0);
        let strict = scan(&[a.clone(), b.clone()], Vec::new(), MIN_RGB_DISTANCE);
        assert_eq!(strict.len(), 1);
        let selected = select_diverse(&[a, b]);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn finalize_normalizes_to_unit_sum() {
        let palette = [
            color([1.0, 1.0, 1.0], 0.0),
            color([0.8, 0.2, 0.2], 0.0),
            color([0.2, 0.8, 0.2], 0.0),
            color([0.2, 0.2, 0.8], 0.0),
        ];
        let out = finalize_weights(palette, &WeightMultipliers::default());
        let total: f32 = out.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
        // Middle entries carry more weight than the extremes.
        assert!(out[1].weight > out[0].weight);
        assert!(out[2].weight > out[3].weight);
    }

    #[test]
    fn zero_total_weight_falls_back_to_uniform() {
        let mut palette = [
            color([1.0, 1.0, 1.0], 0.0),
            color([0.8, 0.2, 0.2], 0.0),
            color([0.2, 0.8, 0.2], 0.0),
            color([0.2, 0.2, 0.8], 0.0),
        ];
        for c in &mut palette {
            c.weight = 0.0;
        }
        let out = finalize_weights(palette, &WeightMultipliers::default());
        for c in &out {
            assert!((c.weight - 0.25).abs() < 1e-6);
        }
    }
}
