//! Photo records and the catalog contract the engine relies on.
//!
//! The catalog is keyed by photo id. It is the only store of which photos
//! exist and whether they have ever been placed in the mosaic; the engine
//! never keeps its own copy. [`crate::db::Database`] is the SQLite
//! implementation.

use crate::error::Result;
use chrono::{DateTime, Utc};

/// One contributed photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub id: String,
    /// Name the file arrived with, without the id prefix.
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the photo has ever been placed in the mosaic.
    pub used: bool,
}

impl Photo {
    /// A record stamped with the current time.
    pub fn create(id: impl Into<String>, filename: impl Into<String>, used: bool) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            timestamp: Utc::now(),
            used,
        }
    }
}

/// Key-value-like store of photo records.
///
/// `Send + Sync` so one catalog can be shared between the service and the
/// render worker.
pub trait ImageCatalog: Send + Sync {
    /// Insert a record. Returns `false` (and changes nothing) if the id is
    /// already cataloged.
    fn insert(&self, photo: &Photo) -> Result<bool>;

    fn get(&self, id: &str) -> Result<Option<Photo>>;

    /// Original file name of a photo.
    fn filename(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get(id)?.map(|p| p.filename))
    }

    /// All records, oldest first; equal timestamps in insertion order.
    fn all(&self) -> Result<Vec<Photo>>;

    fn count(&self) -> Result<usize>;

    /// Set the used flag. Returns `false` if the id is unknown.
    fn mark_used(&self, id: &str) -> Result<bool>;

    /// Remove every record, returning how many were removed.
    fn delete_all(&self) -> Result<usize>;

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }
}
