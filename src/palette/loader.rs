//! Image loading for extraction: decode to RGBA8, honor EXIF orientation,
//! fall back to the configured placeholder when the primary decode fails.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbaImage;
use tracing::{debug, warn};

use crate::error::Error;

/// Decode an image to RGBA8 and apply EXIF orientation if available.
/// Orientation handling is best-effort; missing metadata leaves the image as-is.
pub fn decode_rgba8_oriented(path: &Path) -> anyhow::Result<RgbaImage> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;

    let mut img = img.to_rgba8();

    let orientation: u16 = read_orientation(path).unwrap_or(1);
    match orientation {
        1 => {}
        2 => img = image::imageops::flip_horizontal(&img),
        3 => img = image::imageops::rotate180(&img),
        4 => img = image::imageops::flip_vertical(&img),
        5 => {
            img = image::imageops::rotate90(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        6 => img = image::imageops::rotate90(&img),
        7 => {
            img = image::imageops::rotate270(&img);
            img = image::imageops::flip_horizontal(&img);
        }
        8 => img = image::imageops::rotate270(&img),
        _ => {}
    }

    Ok(img)
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let val = field.value.get_uint(0)?;
    debug!("exif orientation {} for {}", val, path.display());
    Some(val as u16)
}

async fn load_one(path: &Path) -> anyhow::Result<RgbaImage> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || decode_rgba8_oriented(&owned))
        .await
        .context("decode task failed")?
}

/// Load `primary`, or `fallback` if the primary decode fails. When both fail
/// the error names the primary path; the caller shows a static background.
///
/// # Errors
/// Returns [`Error::ImageLoad`] when no image could be decoded.
pub async fn load_with_fallback(
    primary: &Path,
    fallback: Option<&Path>,
) -> Result<RgbaImage, Error> {
    match load_one(primary).await {
        Ok(img) => Ok(img),
        Err(err) => {
            warn!(image = %primary.display(), error = %err, "primary image decode failed");
            let Some(fb) = fallback else {
                return Err(Error::ImageLoad {
                    path: primary.to_path_buf(),
                    reason: err.to_string(),
                });
            };
            match load_one(fb).await {
                Ok(img) => {
                    debug!(fallback = %fb.display(), "using fallback image");
                    Ok(img)
                }
                Err(fb_err) => {
                    warn!(fallback = %fb.display(), error = %fb_err, "fallback image decode failed");
                    Err(Error::ImageLoad {
                        path: primary.to_path_buf(),
                        reason: format!("{err}; fallback {}: {fb_err}", fb.display()),
                    })
                }
            }
        }
    }
}
