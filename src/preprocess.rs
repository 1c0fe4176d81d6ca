//! Image clean-up before text recognition.
//!
//! Every method ends in a single-channel image encoded as PNG. `Auto` picks
//! a method from the photo's brightness and noise.

use crate::exif_parser::read_exif;
use anyhow::{Context, Result};
use exif::{In, Tag};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

const DARK_MEAN: f64 = 80.0;
const NOISY_LAPLACIAN_VAR: f64 = 100.0;
const CONTRAST_STD: f64 = 50.0;

const BRIGHTEN_GAIN: f32 = 1.5;
const BRIGHTEN_OFFSET: f32 = 30.0;
const DENOISE_SIGMA: f32 = 1.0;
const THRESHOLD_BLOCK: u32 = 31;
const THRESHOLD_OFFSET: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessMethod {
    #[default]
    Auto,
    Gray,
    Brighten,
    Denoise,
    Threshold,
    #[serde(alias = "none")]
    Off,
}

impl PreprocessMethod {
    pub fn name(self) -> &'static str {
        match self {
            PreprocessMethod::Auto => "auto",
            PreprocessMethod::Gray => "gray",
            PreprocessMethod::Brighten => "brighten",
            PreprocessMethod::Denoise => "denoise",
            PreprocessMethod::Threshold => "threshold",
            PreprocessMethod::Off => "off",
        }
    }
}

impl fmt::Display for PreprocessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PreprocessMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(PreprocessMethod::Auto),
            "gray" | "grey" | "grayscale" => Ok(PreprocessMethod::Gray),
            "brighten" => Ok(PreprocessMethod::Brighten),
            "denoise" => Ok(PreprocessMethod::Denoise),
            "threshold" => Ok(PreprocessMethod::Threshold),
            "off" | "none" => Ok(PreprocessMethod::Off),
            other => Err(format!(
                "unknown preprocess method '{}' (auto, gray, brighten, denoise, threshold, off)",
                other
            )),
        }
    }
}

/// Turns photo bytes into the bytes handed to a recognition engine.
pub trait Preprocessor: Send + Sync {
    /// `Ok(None)` means "use the original image".
    fn prepare(&self, name: &str, image: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Brightness and sharpness figures of a grayscale image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    pub mean: f64,
    pub std_dev: f64,
    pub laplacian_var: f64,
}

pub fn analyze(gray: &GrayImage) -> ImageStats {
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return ImageStats {
            mean: 0.0,
            std_dev: 0.0,
            laplacian_var: 0.0,
        };
    }

    let n = pixels.len() as f64;
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / n;
    let variance = pixels.iter().map(|&p| (p as f64 - mean).powi(2)).sum::<f64>() / n;

    ImageStats {
        mean,
        std_dev: variance.sqrt(),
        laplacian_var: laplacian_variance(gray),
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let v = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += v;
            sum_sq += v * v;
            count += 1.0;
        }
    }
    let mean = sum / count;
    sum_sq / count - mean * mean
}

/// The concrete method `Auto` resolves to.
pub fn choose_method(stats: &ImageStats) -> PreprocessMethod {
    if stats.mean < DARK_MEAN {
        PreprocessMethod::Brighten
    } else if stats.laplacian_var > NOISY_LAPLACIAN_VAR {
        PreprocessMethod::Denoise
    } else if stats.std_dev > CONTRAST_STD {
        PreprocessMethod::Threshold
    } else {
        PreprocessMethod::Gray
    }
}

/// Rotates/flips according to the EXIF orientation tag (1-8).
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate270().fliph(),
        6 => img.rotate90(),
        7 => img.rotate90().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

fn orientation_of(bytes: &[u8]) -> u32 {
    read_exif(bytes)
        .ok()
        .and_then(|exif| {
            exif.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
        })
        .unwrap_or(1)
}

fn brighten(gray: &GrayImage) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0] as f32;
        Luma([(p * BRIGHTEN_GAIN + BRIGHTEN_OFFSET).round().clamp(0.0, 255.0) as u8])
    })
}

/// Adaptive mean threshold: a pixel turns white when it is brighter than
/// the mean of its block minus a small offset.
fn adaptive_threshold(gray: &GrayImage, block: u32, offset: i64) -> GrayImage {
    let (w, h) = gray.dimensions();
    let stride = w as usize + 1;

    // Summed-area table with a zero first row and column.
    let mut integral = vec![0i64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row = 0i64;
        for x in 0..w as usize {
            row += gray.get_pixel(x as u32, y as u32)[0] as i64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    let half = (block / 2) as i64;
    GrayImage::from_fn(w, h, |x, y| {
        let x0 = (x as i64 - half).max(0) as usize;
        let y0 = (y as i64 - half).max(0) as usize;
        let x1 = (x as i64 + half + 1).min(w as i64) as usize;
        let y1 = (y as i64 + half + 1).min(h as i64) as usize;
        let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1] - integral[y1 * stride + x0]
            + integral[y0 * stride + x0];
        let area = ((x1 - x0) * (y1 - y0)) as i64;
        let p = gray.get_pixel(x, y)[0] as i64;
        if p * area > sum - offset * area {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Applies a concrete method. `Auto` and `Off` are treated as `Gray`.
pub fn apply_method(gray: &GrayImage, method: PreprocessMethod) -> GrayImage {
    match method {
        PreprocessMethod::Brighten => brighten(gray),
        PreprocessMethod::Denoise => image::imageops::blur(gray, DENOISE_SIGMA),
        PreprocessMethod::Threshold => adaptive_threshold(gray, THRESHOLD_BLOCK, THRESHOLD_OFFSET),
        PreprocessMethod::Auto | PreprocessMethod::Gray | PreprocessMethod::Off => gray.clone(),
    }
}

/// Preprocessor backed by the `image` crate, optionally keeping a copy of
/// every prepared image for inspection.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    method: PreprocessMethod,
    debug_dir: Option<PathBuf>,
}

impl ImagePreprocessor {
    pub fn new(method: PreprocessMethod) -> Self {
        ImagePreprocessor {
            method,
            debug_dir: None,
        }
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    pub fn method(&self) -> PreprocessMethod {
        self.method
    }

    /// Decodes, orients, cleans up and re-encodes as PNG. Returns the
    /// concrete method used alongside the bytes.
    pub fn process(&self, image: &[u8]) -> Result<(PreprocessMethod, Vec<u8>)> {
        let img = image::load_from_memory(image).context("Failed to decode image for preprocessing")?;
        let img = apply_orientation(img, orientation_of(image));
        let gray = img.to_luma8();

        let method = match self.method {
            PreprocessMethod::Auto => {
                let stats = analyze(&gray);
                let chosen = choose_method(&stats);
                debug!(
                    "Auto preprocessing: mean {:.1}, std {:.1}, laplacian var {:.1} -> {}",
                    stats.mean, stats.std_dev, stats.laplacian_var, chosen
                );
                chosen
            }
            other => other,
        };

        let out = apply_method(&gray, method);
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(out)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .context("Failed to encode preprocessed image")?;
        Ok((method, buf))
    }

    fn save_debug_copy(&self, dir: &Path, name: &str, png: &[u8]) {
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let target = dir.join(format!("{}.png", stem));
        let result = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&target, png));
        match result {
            Ok(()) => debug!("Saved preprocessed image to {}", target.display()),
            Err(e) => warn!("Could not save preprocessed image {}: {}", target.display(), e),
        }
    }
}

impl Preprocessor for ImagePreprocessor {
    fn prepare(&self, name: &str, image: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.method == PreprocessMethod::Off {
            return Ok(None);
        }
        let (method, png) = self.process(image)?;
        debug!("Preprocessed {} with '{}'", name, method);
        if let Some(dir) = &self.debug_dir {
            self.save_debug_copy(dir, name, &png);
        }
        Ok(Some(png))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(img: &GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn auto_picks_by_brightness_and_noise() {
        let dark = GrayImage::from_pixel(32, 32, Luma([20]));
        assert_eq!(choose_method(&analyze(&dark)), PreprocessMethod::Brighten);

        let flat = GrayImage::from_pixel(32, 32, Luma([150]));
        assert_eq!(choose_method(&analyze(&flat)), PreprocessMethod::Gray);

        let checker = GrayImage::from_fn(32, 32, |x, y| Luma([if (x + y) % 2 == 0 { 90 } else { 250 }]));
        assert_eq!(choose_method(&analyze(&checker)), PreprocessMethod::Denoise);

        // A linear ramp has a zero Laplacian but a wide spread.
        let ramp = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));
        let stats = analyze(&ramp);
        assert!(stats.laplacian_var.abs() < 1e-9);
        assert_eq!(choose_method(&stats), PreprocessMethod::Threshold);
    }

    #[test]
    fn threshold_is_binary() {
        let ramp = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 3 + y) % 256) as u8]));
        let out = adaptive_threshold(&ramp, THRESHOLD_BLOCK, THRESHOLD_OFFSET);
        assert_eq!(out.dimensions(), ramp.dimensions());
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn brighten_saturates() {
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 10 } else { 200 }]));
        let out = brighten(&img);
        assert_eq!(out.get_pixel(0, 0)[0], 45);
        assert_eq!(out.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn orientation_six_swaps_dimensions() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(40, 10));
        let rotated = apply_orientation(img.clone(), 6);
        assert_eq!((rotated.width(), rotated.height()), (10, 40));
        let same = apply_orientation(img, 1);
        assert_eq!((same.width(), same.height()), (40, 10));
    }

    #[test]
    fn prepare_outputs_png_and_debug_copy() {
        let dir = tempfile::tempdir().unwrap();
        let debug_dir = dir.path().join("_preprocessed_debug");
        let pre = ImagePreprocessor::new(PreprocessMethod::Auto).with_debug_dir(&debug_dir);

        let source = encode_png(&GrayImage::from_pixel(16, 8, Luma([30])));
        let out = pre.prepare("IMG_0001.jpg", &source).unwrap().unwrap();

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
        assert!(debug_dir.join("IMG_0001.png").exists());
    }

    #[test]
    fn off_keeps_original_and_garbage_is_an_error() {
        let off = ImagePreprocessor::new(PreprocessMethod::Off);
        assert!(off.prepare("a.jpg", b"not an image").unwrap().is_none());

        let gray = ImagePreprocessor::new(PreprocessMethod::Gray);
        assert!(gray.prepare("a.jpg", b"not an image").is_err());
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("Threshold".parse::<PreprocessMethod>().unwrap(), PreprocessMethod::Threshold);
        assert_eq!("none".parse::<PreprocessMethod>().unwrap(), PreprocessMethod::Off);
        assert!("sharpen".parse::<PreprocessMethod>().is_err());
    }
}
