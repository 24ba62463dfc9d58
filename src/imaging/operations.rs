//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take configuration, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::params::{CropParams, Quality};
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Configuration for producing cell-ready photos.
#[derive(Debug, Clone, Copy)]
pub struct CellCropConfig {
    /// Aspect of one grid cell, normally the nominal cell size in pixels.
    pub aspect: (u32, u32),
    pub quality: Quality,
}

impl CellCropConfig {
    pub fn for_cell_size(cell_size: (u32, u32)) -> Self {
        Self {
            aspect: (cell_size.0.max(1), cell_size.1.max(1)),
            quality: Quality::default(),
        }
    }

    /// Square crop, the shape every processed photo is stored in.
    pub fn square() -> Self {
        Self::for_cell_size((1, 1))
    }
}

/// Plan a crop operation without executing it.
///
/// The output keeps the source file name, so `<id>_<name>` in the upload
/// area maps to the same `<id>_<name>` in the processed area.
pub fn plan_cell_crop(source: &Path, processed_dir: &Path, config: &CellCropConfig) -> CropParams {
    let name = source.file_name().unwrap_or(source.as_os_str());
    CropParams {
        source: source.to_path_buf(),
        output: processed_dir.join(name),
        aspect: config.aspect,
        quality: config.quality,
    }
}

/// Crop an uploaded photo to the cell aspect and write it to the processed area.
///
/// Returns the path of the processed file.
pub fn create_cell_photo(
    backend: &dyn ImageBackend,
    source: &Path,
    processed_dir: &Path,
    config: &CellCropConfig,
) -> Result<PathBuf> {
    if !source.exists() {
        return Err(BackendError::NotFound(source.to_path_buf()));
    }
    let params = plan_cell_crop(source, processed_dir, config);
    backend.crop(&params)?;
    Ok(params.output)
}
