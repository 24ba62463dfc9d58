//! Startup reconciliation of the file areas against the catalog.
//!
//! Three phases, strictly in order. A failure on one file is logged, counted
//! and skipped; a failure to list a directory skips the rest of that phase
//! only.
//!
//! 1. **Drop folder**: every (non-hidden) file gets a fresh id, is copied
//!    into the upload area as `<id>_<name>`, and is removed from the drop
//!    folder.
//! 2. **Processed files**: every `<id>_<name>` in the processed area whose
//!    id is not cataloged is inserted as *used*: it was produced by an
//!    earlier placement.
//! 3. **New uploads**: every upload without a processed counterpart is
//!    square-cropped into the processed area and, if its id is not
//!    cataloged, inserted as *not used*. Uploads whose names do not follow
//!    the convention are first renamed to `<fresh-id>_<name>`.
//!
//! Running the reconciler twice without filesystem changes in between
//! changes nothing the second time.

use crate::catalog::{ImageCatalog, Photo};
use crate::error::{MosaicError, Result};
use crate::imaging::{CellCropConfig, ImageBackend, create_cell_photo};
use crate::naming::{new_photo_id, parse_stored_name, stored_file_name};
use crate::storage::FileStorage;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Counts from one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Uploads cropped into the processed area.
    pub processed: usize,
    /// Catalog records inserted.
    pub cataloged: usize,
    /// Files moved in from the drop folder.
    pub drop_ingested: usize,
    /// Files that failed in any phase.
    pub errors: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.processed == 0 && self.cataloged == 0 && self.drop_ingested == 0
    }
}

pub struct SyncReconciler<'a> {
    backend: &'a dyn ImageBackend,
    catalog: &'a dyn ImageCatalog,
    storage: &'a FileStorage,
    crop: CellCropConfig,
}

impl<'a> SyncReconciler<'a> {
    pub fn new(
        backend: &'a dyn ImageBackend,
        catalog: &'a dyn ImageCatalog,
        storage: &'a FileStorage,
    ) -> Self {
        Self {
            backend,
            catalog,
            storage,
            crop: CellCropConfig::square(),
        }
    }

    /// Run all three phases.
    pub fn run(&self) -> SyncReport {
        info!("reconciliation started");
        let mut report = SyncReport::default();
        self.ingest_drop_folder(&mut report);
        self.catalog_processed(&mut report);
        self.process_uploads(&mut report);
        info!(
            drop_ingested = report.drop_ingested,
            cataloged = report.cataloged,
            processed = report.processed,
            errors = report.errors,
            "reconciliation finished"
        );
        report
    }

    fn ingest_drop_folder(&self, report: &mut SyncReport) {
        let names = match self.storage.drop_files() {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "cannot list drop folder");
                report.errors += 1;
                return;
            }
        };
        for name in names {
            match self.ingest_drop_file(&name) {
                Ok(id) => {
                    debug!(file = %name, id = %id, "drop file ingested");
                    report.drop_ingested += 1;
                }
                Err(e) => {
                    error!(file = %name, error = %e, "drop file ingestion failed");
                    report.errors += 1;
                }
            }
        }
    }

    fn ingest_drop_file(&self, name: &str) -> Result<String> {
        let source = self.storage.drop_dir().join(name);
        let id = new_photo_id();
        self.storage.import_upload(&source, &id, name)?;
        std::fs::remove_file(&source)
            .map_err(|e| MosaicError::io("remove ingested drop file", &source, e))?;
        Ok(id)
    }

    fn catalog_processed(&self, report: &mut SyncReport) {
        let names = match self.storage.processed_files() {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "cannot list processed area");
                report.errors += 1;
                return;
            }
        };
        for name in names {
            let Some(stored) = parse_stored_name(&name) else {
                warn!(file = %name, "processed file name malformed, skipped");
                continue;
            };
            let result = self.catalog.contains(&stored.id).and_then(|known| {
                if known {
                    return Ok(false);
                }
                self.catalog
                    .insert(&Photo::create(&stored.id, &stored.original, true))
            });
            match result {
                Ok(true) => {
                    debug!(id = %stored.id, "processed photo cataloged");
                    report.cataloged += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(file = %name, error = %e, "cataloging processed photo failed");
                    report.errors += 1;
                }
            }
        }
    }

    fn process_uploads(&self, report: &mut SyncReport) {
        let listed = self
            .storage
            .upload_files()
            .and_then(|uploads| Ok((uploads, self.storage.processed_files()?)));
        let (uploads, processed) = match listed {
            Ok(lists) => lists,
            Err(e) => {
                error!(error = %e, "cannot list upload areas");
                report.errors += 1;
                return;
            }
        };
        let processed: HashSet<String> = processed.into_iter().collect();

        for name in uploads {
            if processed.contains(&name) {
                continue;
            }
            match self.process_upload(&name, &processed) {
                Ok(Some(inserted)) => {
                    report.processed += 1;
                    if inserted {
                        report.cataloged += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(file = %name, error = %e, "processing upload failed");
                    report.errors += 1;
                }
            }
        }
    }

    /// Crop one upload. Returns `Some(inserted)` when a processed file was
    /// written, `None` when the renamed upload already had a counterpart.
    fn process_upload(&self, name: &str, processed: &HashSet<String>) -> Result<Option<bool>> {
        let stored = match parse_stored_name(name) {
            Some(stored) => stored,
            None => {
                let id = new_photo_id();
                let renamed = stored_file_name(&id, name);
                let from = self.storage.upload_path(name);
                let to = self.storage.upload_path(&renamed);
                std::fs::rename(&from, &to)
                    .map_err(|e| MosaicError::io("rename malformed upload", &from, e))?;
                warn!(file = %name, renamed = %renamed, "upload name malformed, assigned fresh id");
                match parse_stored_name(&renamed) {
                    Some(stored) => stored,
                    None => return Err(MosaicError::Validation(format!("upload name {name:?}"))),
                }
            }
        };
        if processed.contains(&stored.file_name()) {
            return Ok(None);
        }

        let source = self.storage.upload_path(&stored.file_name());
        create_cell_photo(self.backend, &source, self.storage.processed_dir(), &self.crop)?;

        let inserted = if self.catalog.contains(&stored.id)? {
            false
        } else {
            self.catalog
                .insert(&Photo::create(&stored.id, &stored.original, false))?
        };
        debug!(id = %stored.id, inserted, "upload processed");
        Ok(Some(inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::MemoryCatalog;
    use tempfile::TempDir;

    fn storage_in(tmp: &TempDir) -> FileStorage {
        FileStorage::new(
            tmp.path().join("uploads"),
            tmp.path().join("uploads").join("processed"),
            tmp.path().join("self_uploads"),
        )
        .unwrap()
    }

    #[test]
    fn drop_folder_files_become_uploads_and_catalog_entries() {
        let tmp = TempDir::new().unwrap();
        let storage = storage_in(&tmp);
        std::fs::write(storage.drop_dir().join("selfie.jpg"), b"img").unwrap();
        std::fs::write(storage.drop_dir().join(".hidden"), b"x").unwrap();
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::new();

        let report = SyncReconciler::new(&backend, &catalog, &storage).run();

        assert_eq!(report.drop_ingested, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(report.cataloged, 1);
        assert_eq!(report.errors, 0);
        assert!(!storage.drop_dir().join("selfie.jpg").exists());
        assert!(storage.drop_dir().join(".hidden").exists());

        let uploads = storage.upload_files().unwrap();
        assert_eq!(uploads.len(), 1);
        let stored = parse_stored_name(&uploads[0]).unwrap();
        assert_eq!(stored.original, "selfie.jpg");
        assert_eq!(storage.processed_files().unwrap(), uploads);
        assert_eq!(catalog.is_used(&stored.id), Some(false));
    }

    #[test]
    fn orphan_processed_files_are_cataloged_as_used() {
        let tmp = TempDir::new().unwrap();
        let storage = storage_in(&tmp);
        std::fs::write(storage.processed_path("abc_party.jpg"), b"x").unwrap();
        std::fs::write(storage.processed_path("malformed.jpg"), b"x").unwrap();
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::new();

        let report = SyncReconciler::new(&backend, &catalog, &storage).run();

        assert_eq!(report.cataloged, 1);
        assert_eq!(catalog.ids(), vec!["abc"]);
        assert_eq!(catalog.is_used("abc"), Some(true));
        assert_eq!(catalog.filename("abc").unwrap().as_deref(), Some("party.jpg"));
    }

    #[test]
    fn uploads_with_counterparts_are_not_reprocessed() {
        let tmp = TempDir::new().unwrap();
        let storage = storage_in(&tmp);
        storage.save_upload("abc", "party.jpg", b"x").unwrap();
        std::fs::write(storage.processed_path("abc_party.jpg"), b"x").unwrap();
        let catalog = MemoryCatalog::default();
        catalog.insert(&Photo::create("abc", "party.jpg", true)).unwrap();
        let backend = MockBackend::new();

        let report = SyncReconciler::new(&backend, &catalog, &storage).run();

        assert!(report.is_noop());
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn new_upload_of_cataloged_id_is_cropped_but_not_reinserted() {
        let tmp = TempDir::new().unwrap();
        let storage = storage_in(&tmp);
        storage.save_upload("abc", "party.jpg", b"x").unwrap();
        let catalog = MemoryCatalog::default();
        catalog.insert(&Photo::create("abc", "party.jpg", true)).unwrap();
        let backend = MockBackend::new();

        let report = SyncReconciler::new(&backend, &catalog, &storage).run();

        assert_eq!(report.processed, 1);
        assert_eq!(report.cataloged, 0);
        assert_eq!(catalog.is_used("abc"), Some(true));
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Crop { aspect: (1, 1), .. }
        ));
    }

    #[test]
    fn malformed_upload_is_renamed_before_processing() {
        let tmp = TempDir::new().unwrap();
        let storage = storage_in(&tmp);
        std::fs::write(storage.upload_path("plain.jpg"), b"x").unwrap();
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::new();

        let report = SyncReconciler::new(&backend, &catalog, &storage).run();

        assert_eq!(report.processed, 1);
        let uploads = storage.upload_files().unwrap();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].ends_with("_plain.jpg"));
        assert_eq!(storage.processed_files().unwrap(), uploads);
    }

    #[test]
    fn second_run_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let storage = storage_in(&tmp);
        std::fs::write(storage.drop_dir().join("a.jpg"), b"x").unwrap();
        std::fs::write(storage.upload_path("b.jpg"), b"x").unwrap();
        storage.save_upload("c", "c.jpg", b"x").unwrap();
        std::fs::write(storage.processed_path("d_d.jpg"), b"x").unwrap();
        let catalog = MemoryCatalog::default();
        let backend = MockBackend::new();
        let reconciler = SyncReconciler::new(&backend, &catalog, &storage);

        let first = reconciler.run();
        assert_eq!(first.drop_ingested, 1);
        assert_eq!(first.processed, 3);
        assert_eq!(first.cataloged, 4);
        let ids = catalog.ids();
        let uploads = storage.upload_files().unwrap();
        let processed = storage.processed_files().unwrap();

        let second = reconciler.run();
        assert!(second.is_noop(), "{second:?}");
        assert_eq!(second.errors, 0);
        assert_eq!(catalog.ids(), ids);
        assert_eq!(storage.upload_files().unwrap(), uploads);
        assert_eq!(storage.processed_files().unwrap(), processed);
    }

    #[test]
    fn failing_crop_is_counted_and_skipped() {
        let tmp = TempDir::new().unwrap();
        let storage = storage_in(&tmp);
        storage.save_upload("bad", "broken.jpg", b"not an image").unwrap();
        storage.save_upload("good", "fine.png", b"x").unwrap();
        crate::test_helpers::write_gray_png(&storage.upload_path("good_fine.png"), 8, 8, 100);
        let catalog = MemoryCatalog::default();
        let backend = crate::imaging::RustBackend::new();

        let report = SyncReconciler::new(&backend, &catalog, &storage).run();

        assert_eq!(report.errors, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(catalog.ids(), vec!["good"]);
    }
}
