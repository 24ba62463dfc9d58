//! Shared test utilities for the candle-mosaic test suite.
//!
//! Provides synthetic image writers and in-memory implementations of the
//! catalog and settings store, so engine tests run without SQLite.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! write_gray_png(&tmp.path().join("emblem.png"), 40, 40, 90);
//!
//! let catalog = MemoryCatalog::default();
//! catalog.insert(&Photo::create("abc", "party.jpg", false)).unwrap();
//! assert_eq!(catalog.ids(), vec!["abc"]);
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use image::{GrayImage, ImageEncoder, RgbImage};

use crate::catalog::{ImageCatalog, Photo};
use crate::error::{MosaicError, Result};
use crate::settings::{MosaicSettings, SettingsStore};

// =========================================================================
// Synthetic images
// =========================================================================

/// Write a uniform grayscale PNG.
pub fn write_gray_png(path: &Path, width: u32, height: u32, value: u8) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    GrayImage::from_pixel(width, height, image::Luma([value]))
        .save(path)
        .unwrap();
}

/// Write a grayscale PNG whose pixels are `values`, row-major.
pub fn write_luma_png(path: &Path, width: u32, height: u32, values: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    GrayImage::from_raw(width, height, values.to_vec())
        .unwrap()
        .save(path)
        .unwrap();
}

/// Write a small valid JPEG with a gradient pattern.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

// =========================================================================
// In-memory collaborators
// =========================================================================

/// Catalog held in a `BTreeMap`, for tests that do not need SQLite.
///
/// Each record keeps its insertion sequence so `all` breaks timestamp ties
/// the way SQLite's rowid does.
#[derive(Default)]
pub struct MemoryCatalog {
    photos: Mutex<BTreeMap<String, (u64, Photo)>>,
    next_seq: Mutex<u64>,
}

impl MemoryCatalog {
    /// Cataloged ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.photos.lock().unwrap().keys().cloned().collect()
    }

    pub fn is_used(&self, id: &str) -> Option<bool> {
        self.photos.lock().unwrap().get(id).map(|(_, p)| p.used)
    }
}

impl ImageCatalog for MemoryCatalog {
    fn insert(&self, photo: &Photo) -> Result<bool> {
        let mut photos = self.photos.lock().unwrap();
        if photos.contains_key(&photo.id) {
            return Ok(false);
        }
        let mut seq = self.next_seq.lock().unwrap();
        photos.insert(photo.id.clone(), (*seq, photo.clone()));
        *seq += 1;
        Ok(true)
    }

    fn get(&self, id: &str) -> Result<Option<Photo>> {
        Ok(self.photos.lock().unwrap().get(id).map(|(_, p)| p.clone()))
    }

    fn all(&self) -> Result<Vec<Photo>> {
        let mut all: Vec<(u64, Photo)> = self.photos.lock().unwrap().values().cloned().collect();
        all.sort_by(|(sa, a), (sb, b)| a.timestamp.cmp(&b.timestamp).then(sa.cmp(sb)));
        Ok(all.into_iter().map(|(_, p)| p).collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.photos.lock().unwrap().len())
    }

    fn mark_used(&self, id: &str) -> Result<bool> {
        match self.photos.lock().unwrap().get_mut(id) {
            Some((_, photo)) => {
                photo.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_all(&self) -> Result<usize> {
        let mut photos = self.photos.lock().unwrap();
        let n = photos.len();
        photos.clear();
        Ok(n)
    }
}

/// Settings store holding one record in memory. Loads can be made to fail.
#[derive(Default)]
pub struct MemorySettingsStore {
    record: Mutex<Option<MosaicSettings>>,
    failing: Mutex<bool>,
}

impl MemorySettingsStore {
    pub fn saved(&self) -> Option<MosaicSettings> {
        self.record.lock().unwrap().clone()
    }

    pub fn fail_loads(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<MosaicSettings>> {
        if *self.failing.lock().unwrap() {
            return Err(MosaicError::Validation("stored grid_size \"[1]\"".into()));
        }
        Ok(self.record.lock().unwrap().clone())
    }

    fn save(&self, settings: &MosaicSettings) -> Result<()> {
        *self.record.lock().unwrap() = Some(MosaicSettings {
            regenerate_existing: false,
            ..settings.clone()
        });
        Ok(())
    }
}
