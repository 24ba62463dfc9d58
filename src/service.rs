//! The mosaic engine as one explicitly constructed service.
//!
//! [`MosaicService`] owns the active settings and the grid behind a single
//! mutex. Every grid mutation (assignment, rebuild, reset) happens inside
//! that lock, so two concurrent ingestions can never pick the same empty
//! cell, and a settings change either fully precedes or fully follows any
//! assignment.
//!
//! Rendering takes a snapshot of the grid under the lock and paints outside
//! it. A separate render lock serializes writers of the output file; a
//! snapshot that was superseded while painting is repainted before it is
//! written.
//!
//! ```text
//! ingest_upload ─► save + identify ─► catalog ─► crop ─► add_photo ─► (render)
//!                                                     │
//!                                  measure tone ──────┘ assign under lock
//! ```

use crate::assign::{Placement, assign};
use crate::catalog::{ImageCatalog, Photo};
use crate::error::{MosaicError, Result};
use crate::grid::{Grid, build_grid, install_grid};
use crate::imaging::{CellCropConfig, ImageBackend, create_cell_photo, is_supported_image};
use crate::naming::{new_photo_id, stored_file_name};
use crate::notify::Notifier;
use crate::render::{CatalogTiles, RenderReport, RenderTarget, paint, write_and_publish};
use crate::settings::{MosaicSettings, SettingsController, SettingsStore};
use crate::storage::FileStorage;
use crate::sync::{SyncReconciler, SyncReport};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Attempts at painting a snapshot that is still current when written.
const RENDER_ATTEMPTS: usize = 3;

/// Outcome of re-placing every cataloged photo.
#[derive(Debug, Clone, PartialEq)]
pub struct RegenerateReport {
    pub placed: usize,
    pub failed: usize,
    pub render: RenderReport,
}

/// Outcome of one pass over the drop folder.
#[derive(Debug, Default)]
pub struct DropPoll {
    pub placed: Vec<(String, Placement)>,
    pub failed: Vec<(String, MosaicError)>,
}

struct EngineState {
    controller: SettingsController,
    grid: Option<Grid>,
}

/// Build the grid from the active settings on first use.
fn ensure_grid<'g>(
    grid: &'g mut Option<Grid>,
    settings: &MosaicSettings,
    backend: &dyn ImageBackend,
) -> Result<&'g mut Grid> {
    if grid.is_none() {
        *grid = Some(build_grid(
            backend,
            &settings.emblem_path,
            settings.grid_size,
            settings.output_size,
        )?);
    }
    grid.as_mut()
        .ok_or_else(|| MosaicError::Validation("grid unavailable".into()))
}

pub struct MosaicService {
    backend: Arc<dyn ImageBackend>,
    catalog: Arc<dyn ImageCatalog>,
    storage: FileStorage,
    notifier: Arc<Notifier>,
    target: RenderTarget,
    state: Mutex<EngineState>,
    render_lock: Mutex<()>,
}

impl MosaicService {
    /// Wire up the engine. No grid is built until it is first needed or
    /// [`load_settings`](Self::load_settings) runs.
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        catalog: Arc<dyn ImageCatalog>,
        settings_store: Arc<dyn SettingsStore>,
        storage: FileStorage,
        notifier: Arc<Notifier>,
        target: RenderTarget,
        defaults: MosaicSettings,
    ) -> Self {
        Self {
            backend,
            catalog,
            storage,
            notifier,
            target,
            state: Mutex::new(EngineState {
                controller: SettingsController::new(settings_store, defaults),
                grid: None,
            }),
            render_lock: Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Adopt the stored settings (or defaults), build the grid for them, and
    /// put back every photo the catalog marks as used.
    ///
    /// Photos are re-placed oldest first, so the grid ends up as it was after
    /// the last placement of the previous run. An unreadable emblem is fatal
    /// here: the engine cannot run without it.
    pub fn load_settings(&self) -> Result<MosaicSettings> {
        let settings = self.state().controller.load().clone();
        let mut fresh = build_grid(
            self.backend.as_ref(),
            &settings.emblem_path,
            settings.grid_size,
            settings.output_size,
        )?;
        let restored = self.restore_placements(&mut fresh)?;
        install_grid(&mut self.state().grid, fresh);
        info!(restored, "grid ready");
        Ok(settings)
    }

    pub fn settings(&self) -> MosaicSettings {
        self.state().controller.active().clone()
    }

    pub fn cell_size(&self) -> (u32, u32) {
        self.state().controller.cell_size()
    }

    /// Copy of the current grid.
    pub fn grid_snapshot(&self) -> Result<Grid> {
        let mut state = self.state();
        let EngineState { controller, grid } = &mut *state;
        Ok(ensure_grid(grid, controller.active(), self.backend.as_ref())?.clone())
    }

    /// Apply new settings. Returns whether the grid was rebuilt.
    ///
    /// A rebuild is followed by a render of the (now empty) mosaic; with
    /// `regenerate_existing` set, every cataloged photo is re-placed instead.
    pub fn update_settings(&self, next: MosaicSettings) -> Result<bool> {
        let regenerate = next.regenerate_existing;
        let rebuilt = {
            let mut state = self.state();
            let EngineState { controller, grid } = &mut *state;
            controller.apply(next, grid, self.backend.as_ref())?
        };
        if regenerate {
            self.regenerate()?;
        } else if rebuilt {
            self.render()?;
        }
        Ok(rebuilt)
    }

    /// Place an already cataloged, already processed photo.
    ///
    /// The tone is measured before the grid lock is taken; selection and
    /// mutation happen under it. Marking the photo used is best-effort.
    pub fn add_photo(&self, id: &str) -> Result<Placement> {
        let filename = self
            .catalog
            .filename(id)?
            .ok_or_else(|| MosaicError::NotFound {
                what: "photo",
                id: id.to_string(),
            })?;
        let path = self.storage.processed_photo_path(id, &filename);
        let tone = self.backend.measure_tone(&path)?;

        let placement = {
            let mut state = self.state();
            let EngineState { controller, grid } = &mut *state;
            let grid = ensure_grid(grid, controller.active(), self.backend.as_ref())?;
            assign(grid, id, &tone)?
        };

        match self.catalog.mark_used(id) {
            Ok(true) => {}
            Ok(false) => warn!(photo = id, "placed photo vanished from catalog"),
            Err(e) => warn!(photo = id, error = %e, "failed to mark photo used"),
        }
        info!(photo = id, x = placement.x, y = placement.y, "photo added to mosaic");
        Ok(placement)
    }

    /// Store, catalog, crop and place a new upload. Does not render.
    ///
    /// Names without a decodable extension are refused, and content that
    /// does not decode is removed again before anything is cataloged.
    pub fn ingest_upload(&self, original_name: &str, content: &[u8]) -> Result<Placement> {
        if !is_supported_image(Path::new(original_name)) {
            return Err(MosaicError::Validation(format!(
                "unsupported photo type: {original_name}"
            )));
        }
        let id = new_photo_id();
        let upload = self.storage.save_upload(&id, original_name, content)?;
        if let Err(e) = self.backend.identify(&upload) {
            if let Err(rm) = std::fs::remove_file(&upload) {
                warn!(file = %upload.display(), error = %rm, "cannot remove rejected upload");
            }
            return Err(e.into());
        }
        self.catalog
            .insert(&Photo::create(&id, original_name, false))?;
        create_cell_photo(
            self.backend.as_ref(),
            &upload,
            self.storage.processed_dir(),
            &CellCropConfig::square(),
        )?;
        self.add_photo(&id)
    }

    /// [`ingest_upload`](Self::ingest_upload) followed by a render.
    pub fn ingest_upload_and_render(
        &self,
        original_name: &str,
        content: &[u8],
    ) -> Result<(Placement, RenderReport)> {
        let placement = self.ingest_upload(original_name, content)?;
        let report = self.render()?;
        Ok((placement, report))
    }

    /// Ingest a file from disk under its own file name.
    pub fn ingest_file(&self, path: &Path) -> Result<Placement> {
        let content =
            std::fs::read(path).map_err(|e| MosaicError::io("read photo", path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| MosaicError::Validation(format!("photo path {}", path.display())))?;
        self.ingest_upload(&name, &content)
    }

    /// Repaint the full mosaic, write it, and publish the URL.
    pub fn render(&self) -> Result<RenderReport> {
        let _writer = self.render_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let tiles = CatalogTiles {
            catalog: self.catalog.as_ref(),
            storage: &self.storage,
        };

        let mut snapshot = self.grid_snapshot()?;
        let mut painted = paint(&snapshot, &tiles, self.backend.as_ref());
        for _ in 1..RENDER_ATTEMPTS {
            let current = self.grid_snapshot()?;
            if current.generation() == snapshot.generation() {
                break;
            }
            debug!(
                painted = snapshot.generation(),
                current = current.generation(),
                "grid rebuilt while painting, repainting"
            );
            painted = paint(&current, &tiles, self.backend.as_ref());
            snapshot = current;
        }

        let (canvas, stats) = painted;
        write_and_publish(
            &canvas,
            stats,
            snapshot.generation(),
            self.backend.as_ref(),
            &self.target,
            &self.notifier,
        )
    }

    /// Rebuild the grid and re-place every cataloged photo, oldest first.
    ///
    /// Uploads that still exist are re-cropped so processed files match the
    /// current crop. Per-photo failures are logged and skipped.
    pub fn regenerate(&self) -> Result<RegenerateReport> {
        self.rebuild_grid()?;

        let mut placed = 0;
        let mut failed = 0;
        for photo in self.catalog.all()? {
            let name = stored_file_name(&photo.id, &photo.filename);
            let upload = self.storage.upload_path(&name);
            if upload.exists() {
                if let Err(e) = create_cell_photo(
                    self.backend.as_ref(),
                    &upload,
                    self.storage.processed_dir(),
                    &CellCropConfig::square(),
                ) {
                    warn!(photo = %photo.id, error = %e, "re-crop failed, using existing processed file");
                }
            }
            if !self.storage.processed_path(&name).exists() {
                debug!(photo = %photo.id, "no processed file, skipped");
                continue;
            }
            match self.add_photo(&photo.id) {
                Ok(_) => placed += 1,
                Err(e) => {
                    error!(photo = %photo.id, error = %e, "re-placing photo failed");
                    failed += 1;
                }
            }
        }

        let render = self.render()?;
        info!(placed, failed, "mosaic regenerated");
        Ok(RegenerateReport {
            placed,
            failed,
            render,
        })
    }

    /// Delete every photo, file and the rendered output, then render the
    /// empty mosaic.
    pub fn reset_all(&self) -> Result<RenderReport> {
        warn!("resetting mosaic");
        let removed = self.catalog.delete_all()?;
        let files = self.storage.clear_all()?;
        match std::fs::remove_file(&self.target.output_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MosaicError::io(
                    "remove rendered mosaic",
                    &self.target.output_path,
                    e,
                ));
            }
        }
        self.rebuild_grid()?;
        info!(removed, files, "mosaic reset");
        self.render()
    }

    /// Number of cataloged photos.
    pub fn participant_count(&self) -> Result<usize> {
        self.catalog.count()
    }

    /// Reconcile the file areas with the catalog.
    pub fn sync(&self) -> SyncReport {
        SyncReconciler::new(self.backend.as_ref(), self.catalog.as_ref(), &self.storage).run()
    }

    /// Ingest every drop-folder file not named in `skip`.
    ///
    /// Ingested files are removed from the drop folder; files that fail stay
    /// where they are. A folder that cannot be listed gives an empty pass.
    pub fn poll_drop_folder(&self, skip: &HashSet<String>) -> DropPoll {
        let mut poll = DropPoll::default();
        let names = match self.storage.drop_files() {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "cannot list drop folder");
                return poll;
            }
        };
        for name in names.into_iter().filter(|n| !skip.contains(n)) {
            let path = self.storage.drop_dir().join(&name);
            match self.ingest_file(&path) {
                Ok(placement) => {
                    if let Err(e) = std::fs::remove_file(&path) {
                        let err = MosaicError::io("remove ingested drop file", &path, e);
                        error!(file = %name, error = %err, "drop file ingested but not removed");
                        poll.failed.push((name.clone(), err));
                    }
                    poll.placed.push((name, placement));
                }
                Err(e) => {
                    error!(file = %name, error = %e, "drop file ingestion failed");
                    poll.failed.push((name, e));
                }
            }
        }
        poll
    }

    /// Replace the grid with a fresh one for the active settings.
    fn rebuild_grid(&self) -> Result<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let settings = state.controller.active().clone();
        let fresh = build_grid(
            self.backend.as_ref(),
            &settings.emblem_path,
            settings.grid_size,
            settings.output_size,
        )?;
        install_grid(&mut state.grid, fresh);
        Ok(())
    }

    /// Place every used, still processed photo into `grid`, oldest first.
    /// Returns how many were placed; per-photo failures are logged.
    fn restore_placements(&self, grid: &mut Grid) -> Result<usize> {
        let mut restored = 0;
        for photo in self.catalog.all()?.into_iter().filter(|p| p.used) {
            let path = self.storage.processed_photo_path(&photo.id, &photo.filename);
            if !path.exists() {
                debug!(photo = %photo.id, "no processed file, not restored");
                continue;
            }
            let placed = self
                .backend
                .measure_tone(&path)
                .map_err(MosaicError::from)
                .and_then(|tone| assign(grid, &photo.id, &tone));
            match placed {
                Ok(_) => restored += 1,
                Err(e) => warn!(photo = %photo.id, error = %e, "restoring photo failed"),
            }
        }
        Ok(restored)
    }
}
