//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Emblem sampling** | exact resize to grid size + grayscale |
//! | **Tone** | grayscale mean / standard deviation |
//! | **Cell crop** | centered crop to the cell aspect |
//! | **Tile / composite** | Lanczos3 resize, JPEG encode |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for geometry and tone math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, Tone};
pub(crate) use calculations::mean_and_std_dev;
pub use calculations::{
    CropRegion, calculate_cell_size, calculate_crop_region, cell_span, luma_tone,
};
pub use operations::{CellCropConfig, create_cell_photo};
pub use params::{CropParams, Quality};
pub use rust_backend::{RustBackend, is_supported_image};
