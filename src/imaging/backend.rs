//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines every pixel operation the engine needs:
//! identify, emblem luma sampling, photo tone measurement, cell-aspect crop,
//! tile loading, and writing the composite.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend) — pure Rust, built on the
//! `image` crate. Tests swap in the recording `MockBackend` below.

use super::params::{CropParams, Quality};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Grayscale tone of an image on the 0–255 scale.
///
/// - `brightness`: mean luma of all pixels
/// - `contrast`: population standard deviation of luma
///
/// Used both as a photo's signature and as a grid cell's target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tone {
    pub brightness: f64,
    pub contrast: f64,
}

/// Trait for image processing backends.
///
/// `Sync` so a single backend can be shared by the rayon tile loaders and
/// the render worker thread.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Resize the image to exactly `width`×`height`, convert to grayscale,
    /// and return the luma values in row-major order.
    fn sample_luma(&self, path: &Path, width: u32, height: u32) -> Result<Vec<u8>, BackendError>;

    /// Measure the grayscale tone of the whole image.
    fn measure_tone(&self, path: &Path) -> Result<Tone, BackendError>;

    /// Center-crop to the requested aspect and write the result.
    fn crop(&self, params: &CropParams) -> Result<(), BackendError>;

    /// Decode an image and resize it to exactly `width`×`height` RGB.
    fn load_tile(&self, path: &Path, width: u32, height: u32) -> Result<RgbImage, BackendError>;

    /// Encode the composite canvas to `path`, replacing any previous file.
    fn write_composite(
        &self,
        canvas: &RgbImage,
        path: &Path,
        quality: Quality,
    ) -> Result<(), BackendError>;
}
