//! Centralized filename parsing for the `<id>_<original-name>` convention.
//!
//! Every file the engine manages in the upload and processed areas is stored
//! under its photo id, an underscore, and the name it arrived with:
//!
//! - `3f2a…c9_party.jpg` → id `3f2a…c9`, original name `party.jpg`
//! - `3f2a…c9_my_best_shot.png` → id `3f2a…c9`, original `my_best_shot.png`
//!
//! Only the **first** underscore separates; the original name may contain
//! more. Ids are hex uuids and never contain an underscore.

/// Result of parsing a stored name like `3f2a_party.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredName {
    /// Photo id (everything before the first underscore).
    pub id: String,
    /// Original file name (everything after the first underscore).
    pub original: String,
}

impl StoredName {
    pub fn new(id: impl Into<String>, original: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            original: original.into(),
        }
    }

    /// The file name this entry is stored under.
    pub fn file_name(&self) -> String {
        stored_file_name(&self.id, &self.original)
    }
}

/// Build the stored file name for a photo.
pub fn stored_file_name(id: &str, original: &str) -> String {
    format!("{id}_{original}")
}

/// Parse a stored file name.
///
/// Returns `None` for malformed names: no underscore, an empty id, or an
/// empty original name.
///
/// - `"abc_party.jpg"` → id=`abc`, original=`party.jpg`
/// - `"abc_my_shot.jpg"` → id=`abc`, original=`my_shot.jpg`
/// - `"party.jpg"` → `None`
/// - `"_party.jpg"` → `None`
pub fn parse_stored_name(name: &str) -> Option<StoredName> {
    let (id, original) = name.split_once('_')?;
    if id.is_empty() || original.is_empty() {
        return None;
    }
    Some(StoredName::new(id, original))
}

/// A fresh opaque photo id: a v4 uuid as 32 lowercase hex digits.
pub fn new_photo_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Hidden files (dotfiles such as `.DS_Store`) are never treated as photos.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}
