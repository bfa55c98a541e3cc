//! Median-cut color quantization over normalized RGB.
//!
//! Produces a bounded, deterministic-per-image set of representative colors.
//! Boxes split along their widest channel at the pixel-count median; each
//! surviving box contributes its mean color.

use image::RgbaImage;
use image::imageops::{self, FilterType};

/// Images larger than this on either side are downsampled before sampling
/// pixels; keeps quantization cost bounded on full-resolution product shots.
const MAX_SAMPLE_DIM: u32 = 112;

/// Quantize an image into at most `max_colors` representative colors.
/// Fully transparent pixels are ignored.
#[must_use]
pub fn quantize(image: &RgbaImage, max_colors: usize) -> Vec<[f32; 3]> {
    median_cut(&sample_pixels(image), max_colors)
}

fn sample_pixels(image: &RgbaImage) -> Vec<[f32; 3]> {
    let (w, h) = image.dimensions();
    let scaled;
    let source = if w > MAX_SAMPLE_DIM || h > MAX_SAMPLE_DIM {
        scaled = imageops::resize(image, MAX_SAMPLE_DIM, MAX_SAMPLE_DIM, FilterType::Triangle);
        &scaled
    } else {
        image
    };

    source
        .pixels()
        .filter(|p| p[3] > 0)
        .map(|p| {
            [
                f32::from(p[0]) / 255.0,
                f32::from(p[1]) / 255.0,
                f32::from(p[2]) / 255.0,
            ]
        })
        .collect()
}

/// Median-cut over a pixel sample. Returns one mean color per box, at most
/// `max_colors` of them; empty input yields an empty palette.
#[must_use]
pub fn median_cut(pixels: &[[f32; 3]], max_colors: usize) -> Vec<[f32; 3]> {
    if pixels.is_empty() || max_colors == 0 {
        return Vec::new();
    }

    let mut boxes: Vec<Vec<[f32; 3]>> = vec![pixels.to_vec()];
    while boxes.len() < max_colors {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() > 1 && widest_channel(b).1 > f32::EPSILON)
            .max_by(|(_, a), (_, b)| split_priority(a).total_cmp(&split_priority(b)))
            .map(|(i, _)| i);
        let Some(idx) = candidate else { break };

        let cell = boxes.swap_remove(idx);
        let (lo, hi) = split(cell);
        boxes.push(lo);
        boxes.push(hi);
    }

    boxes.iter().map(|b| mean_color(b)).collect()
}

/// Bigger, more varied boxes split first.
fn split_priority(pixels: &[[f32; 3]]) -> f32 {
    pixels.len() as f32 * widest_channel(pixels).1
}

/// Channel index with the largest value range, plus that range.
fn widest_channel(pixels: &[[f32; 3]]) -> (usize, f32) {
    let mut lo = [f32::MAX; 3];
    let mut hi = [f32::MIN; 3];
    for p in pixels {
        for c in 0..3 {
            lo[c] = lo[c].min(p[c]);
            hi[c] = hi[c].max(p[c]);
        }
    }
    let mut channel = 0;
    let mut range = hi[0] - lo[0];
    for c in 1..3 {
        if hi[c] - lo[c] > range {
            channel = c;
            range = hi[c] - lo[c];
        }
    }
    (channel, range)
}

fn split(mut pixels: Vec<[f32; 3]>) -> (Vec<[f32; 3]>, Vec<[f32; 3]>) {
    let (channel, _) = widest_channel(&pixels);
    pixels.sort_unstable_by(|a, b| a[channel].total_cmp(&b[channel]));
    // Both halves must stay non-empty.
    let at = (pixels.len() / 2).clamp(1, pixels.len() - 1);
    let hi = pixels.split_off(at);
    (pixels, hi)
}

fn mean_color(pixels: &[[f32; 3]]) -> [f32; 3] {
    let mut sum = [0.0f64; 3];
    for p in pixels {
        for c in 0..3 {
            sum[c] += f64::from(p[c]);
        }
    }
    let n = pixels.len().max(1) as f64;
    [
        (sum[0] / n) as f32,
        (sum[1] / n) as f32,
        (sum[2] / n) as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn empty_input_yields_empty_palette() {
        assert!(median_cut(&[], 20).is_empty());
    }

    #[test]
    fn output_is_bounded() {
        let pixels: Vec<[f32; 3]> = (0..256)
            .map(|i| {
                let v = i as f32 / 255.0;
                [v, 1.0 - v, (i % 7) as f32 / 7.0]
            })
            .collect();
        assert!(median_cut(&pixels, 20).len() <= 20);
        assert_eq!(median_cut(&pixels, 1).len(), 1);
    }

    #[test]
    fn uniform_input_collapses_to_one_color() {
        let pixels = vec![[0.3, 0.6, 0.9]; 64];
        let palette = median_cut(&pixels, 20);
        assert_eq!(palette.len(), 1);
        for c in 0..3 {
            assert!((palette[0][c] - pixels[0][c]).abs() < 1e-6);
        }
    }

    #[test]
    fn two_clusters_split_near_their_means() {
        let mut pixels = vec![[0.9, 0.1, 0.1]; 100];
        pixels.extend(vec![[0.1, 0.9, 0.1]; 100]);
        let palette = median_cut(&pixels, 2);
        assert_eq!(palette.len(), 2);
        let mut reds = 0;
        let mut greens = 0;
        for p in &palette {
            if p[0] > 0.8 && p[1] < 0.2 {
                reds += 1;
            }
            if p[1] > 0.8 && p[0] < 0.2 {
                greens += 1;
            }
        }
        assert_eq!((reds, greens), (1, 1));
    }

    #[test]
    fn deterministic_for_the_same_image() {
        let mut img = RgbaImage::new(8, 8);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x * 32) as u8, (y * 32) as u8, 128, 255]);
        }
        assert_eq!(quantize(&img, 20), quantize(&img, 20));
    }

    #[test]
    fn transparent_pixels_are_ignored() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([0, 255, 0, 0]));
        let palette = quantize(&img, 20);
        assert_eq!(palette.len(), 1);
        assert!(palette[0][0] > 0.9 && palette[0][1] < 0.1);
    }
}
