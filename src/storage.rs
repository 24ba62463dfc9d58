//! File areas managed by the engine.
//!
//! ```text
//! uploads/                     # raw uploads, <id>_<original-name>
//! uploads/processed/           # cell-ready crops, same names as uploads
//! self_uploads/                # drop folder, files in any name
//! ```
//!
//! The processed area may live inside the upload area; listings only look at
//! the immediate files of each directory, so the nesting never leaks.

use crate::error::{MosaicError, Result};
use crate::naming::{is_hidden, stored_file_name};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Filesystem-backed storage for uploads, processed crops, and the drop folder.
#[derive(Debug, Clone)]
pub struct FileStorage {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
    drop_dir: PathBuf,
}

impl FileStorage {
    /// Create the storage, making sure all three directories exist.
    pub fn new(upload_dir: PathBuf, processed_dir: PathBuf, drop_dir: PathBuf) -> Result<Self> {
        for dir in [&upload_dir, &processed_dir, &drop_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| MosaicError::io("create storage directory", dir, e))?;
        }
        info!(
            upload = %upload_dir.display(),
            processed = %processed_dir.display(),
            drop = %drop_dir.display(),
            "storage directories ready"
        );
        Ok(Self {
            upload_dir,
            processed_dir,
            drop_dir,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    pub fn drop_dir(&self) -> &Path {
        &self.drop_dir
    }

    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.upload_dir.join(name)
    }

    pub fn processed_path(&self, name: &str) -> PathBuf {
        self.processed_dir.join(name)
    }

    /// Processed file for a cataloged photo.
    pub fn processed_photo_path(&self, id: &str, original: &str) -> PathBuf {
        self.processed_path(&stored_file_name(id, original))
    }

    /// Write uploaded bytes as `<id>_<original>` in the upload area.
    pub fn save_upload(&self, id: &str, original: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.upload_path(&stored_file_name(id, original));
        std::fs::write(&path, content).map_err(|e| MosaicError::io("save upload", &path, e))?;
        info!(id, original, bytes = content.len(), "upload saved");
        Ok(path)
    }

    /// Copy a file from anywhere into the upload area as `<id>_<original>`.
    pub fn import_upload(&self, source: &Path, id: &str, original: &str) -> Result<PathBuf> {
        let dest = self.upload_path(&stored_file_name(id, original));
        std::fs::copy(source, &dest).map_err(|e| MosaicError::io("copy into uploads", source, e))?;
        debug!(from = %source.display(), to = %dest.display(), "file imported");
        Ok(dest)
    }

    /// File names in the upload area (sorted, hidden files skipped).
    pub fn upload_files(&self) -> Result<Vec<String>> {
        list_files(&self.upload_dir)
    }

    /// File names in the processed area (sorted, hidden files skipped).
    pub fn processed_files(&self) -> Result<Vec<String>> {
        list_files(&self.processed_dir)
    }

    /// File names in the drop folder (sorted, hidden files skipped).
    pub fn drop_files(&self) -> Result<Vec<String>> {
        list_files(&self.drop_dir)
    }

    /// Delete every file in the upload and processed areas.
    ///
    /// Returns the number of files removed. Failures on single files are
    /// logged and do not stop the sweep.
    pub fn clear_all(&self) -> Result<usize> {
        warn!("clearing upload and processed areas");
        let mut removed = 0;
        for dir in [&self.upload_dir, &self.processed_dir] {
            for name in list_files(dir)? {
                let path = dir.join(&name);
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove file"),
                }
            }
        }
        info!(removed, "storage cleared");
        Ok(removed)
    }
}

/// Immediate regular files of `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            MosaicError::io("list directory", path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_hidden(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
