//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders, format sniffed from content) |
//! | Emblem sampling | `DynamicImage::resize_exact` (`Triangle`) then `to_luma8` |
//! | Tone | `to_luma8` + [`luma_tone`](super::calculations::luma_tone) |
//! | Crop | `DynamicImage::crop_imm` on a [`calculate_crop_region`](super::calculations::calculate_crop_region) |
//! | Tile | `DynamicImage::resize_exact` (`Lanczos3`) |
//! | Encode | `JpegEncoder` with explicit quality, otherwise format from extension |

use super::backend::{BackendError, Dimensions, ImageBackend, Tone};
use super::calculations::{calculate_crop_region, luma_tone};
use super::params::{CropParams, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::path::Path;

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

/// Returns true if the file extension names a format we can decode.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            PHOTO_CANDIDATES
                .iter()
                .any(|(candidate, fmt)| ext.eq_ignore_ascii_case(candidate) && fmt.reading_enabled())
        })
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
///
/// The format is sniffed from the file content, so uploads with a missing
/// or wrong extension still decode.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    let reader = ImageReader::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BackendError::NotFound(path.to_path_buf()),
        _ => BackendError::Io(e),
    })?;
    reader
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| BackendError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
}

/// Save an image, using the requested quality for JPEG output.
fn save_image(img: &DynamicImage, path: &Path, quality: Quality) -> Result<(), BackendError> {
    if is_jpeg(path) {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        let encoder = JpegEncoder::new_with_quality(writer, quality.value() as u8);
        // JPEG has no alpha channel
        return DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(encoder)
            .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {e}")));
    }
    img.save(path).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to write {}: {}", path.display(), e))
    })
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        if !path.exists() {
            return Err(BackendError::NotFound(path.to_path_buf()));
        }
        let (width, height) = image::image_dimensions(path).map_err(|e| BackendError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Dimensions { width, height })
    }

    fn sample_luma(&self, path: &Path, width: u32, height: u32) -> Result<Vec<u8>, BackendError> {
        let img = load_image(path)?;
        let sampled = img.resize_exact(width, height, FilterType::Triangle);
        Ok(sampled.to_luma8().into_raw())
    }

    fn measure_tone(&self, path: &Path) -> Result<Tone, BackendError> {
        let img = load_image(path)?;
        Ok(luma_tone(img.to_luma8().as_raw()))
    }

    fn crop(&self, params: &CropParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let region = calculate_crop_region((img.width(), img.height()), params.aspect);
        let cropped = img.crop_imm(region.x, region.y, region.width, region.height);
        if let Some(parent) = params.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        save_image(&cropped, &params.output, params.quality)
    }

    fn load_tile(&self, path: &Path, width: u32, height: u32) -> Result<RgbImage, BackendError> {
        let img = load_image(path)?;
        Ok(img.resize_exact(width, height, FilterType::Lanczos3).to_rgb8())
    }

    fn write_composite(
        &self,
        canvas: &RgbImage,
        path: &Path,
        quality: Quality,
    ) -> Result<(), BackendError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        save_image(&DynamicImage::ImageRgb8(canvas.clone()), path, quality)
    }
}
