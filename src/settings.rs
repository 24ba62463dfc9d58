//! Mosaic settings and the controller that applies them.
//!
//! The active [`MosaicSettings`] is a single record, replaced wholesale. A
//! change to grid size, output size or emblem forces a grid rebuild; title
//! and subtitle are display-only and never do.
//!
//! Applying a change is ordered so that a failure leaves everything as it
//! was:
//!
//! ```text
//! validate → build new grid (if needed) → persist → swap settings + grid
//! ```

use crate::error::{MosaicError, Result};
use crate::grid::{Grid, build_grid, install_grid};
use crate::imaging::{ImageBackend, calculate_cell_size};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_GRID_SIZE: (u32, u32) = (20, 20);
pub const DEFAULT_OUTPUT_SIZE: (u32, u32) = (1000, 1000);
pub const DEFAULT_EMBLEM_PATH: &str = "static/base/emblem.png";
pub const DEFAULT_TITLE: &str = "Candle Night Mosaic";
pub const DEFAULT_SUBTITLE: &str = "Our memories, together";

/// Bounds applied to administrator-entered grid dimensions.
pub const GRID_BOUNDS: RangeInclusive<u32> = 5..=100;
/// Bounds applied to administrator-entered output dimensions.
pub const OUTPUT_BOUNDS: RangeInclusive<u32> = 100..=5000;

#[derive(Debug, Clone, PartialEq)]
pub struct MosaicSettings {
    /// Cells across and down.
    pub grid_size: (u32, u32),
    pub emblem_path: PathBuf,
    /// Pixel size of the rendered composite.
    pub output_size: (u32, u32),
    pub title: String,
    pub subtitle: String,
    /// Request to re-place every existing photo after the change. Never
    /// persisted.
    pub regenerate_existing: bool,
}

impl Default for MosaicSettings {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            emblem_path: PathBuf::from(DEFAULT_EMBLEM_PATH),
            output_size: DEFAULT_OUTPUT_SIZE,
            title: DEFAULT_TITLE.to_string(),
            subtitle: DEFAULT_SUBTITLE.to_string(),
            regenerate_existing: false,
        }
    }
}

impl MosaicSettings {
    /// Nominal cell size, `output / grid` per axis.
    pub fn cell_size(&self) -> (u32, u32) {
        calculate_cell_size(self.output_size, self.grid_size)
    }

    /// Reject dimensions the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let (gw, gh) = self.grid_size;
        if gw == 0 || gh == 0 {
            return Err(MosaicError::Validation(format!("grid size {gw}x{gh}")));
        }
        let (ow, oh) = self.output_size;
        if ow == 0 || oh == 0 {
            return Err(MosaicError::Validation(format!("output size {ow}x{oh}")));
        }
        Ok(())
    }

    /// Clamp grid and output dimensions into the administrator bounds.
    pub fn clamped(mut self) -> Self {
        let clamp = |(w, h): (u32, u32), bounds: &RangeInclusive<u32>| {
            (
                w.clamp(*bounds.start(), *bounds.end()),
                h.clamp(*bounds.start(), *bounds.end()),
            )
        };
        self.grid_size = clamp(self.grid_size, &GRID_BOUNDS);
        self.output_size = clamp(self.output_size, &OUTPUT_BOUNDS);
        self
    }

    /// Whether moving from `self` to `next` invalidates the grid.
    pub fn needs_rebuild(&self, next: &MosaicSettings) -> bool {
        self.grid_size != next.grid_size
            || self.output_size != next.output_size
            || self.emblem_path != next.emblem_path
    }
}

/// Encode a dimension pair the way it is stored: a two-element JSON array.
pub fn encode_pair((a, b): (u32, u32)) -> String {
    serde_json::json!([a, b]).to_string()
}

/// Decode a stored dimension pair. Anything other than exactly two
/// non-negative integers is a validation failure.
pub fn decode_pair(field: &str, raw: &str) -> Result<(u32, u32)> {
    let [a, b]: [u32; 2] = serde_json::from_str(raw)
        .map_err(|e| MosaicError::Validation(format!("stored {field} {raw:?}: {e}")))?;
    Ok((a, b))
}

/// Single-record settings persistence.
pub trait SettingsStore: Send + Sync {
    /// The stored record, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<MosaicSettings>>;

    /// Replace the stored record.
    fn save(&self, settings: &MosaicSettings) -> Result<()>;
}

/// Owns the active settings and decides when the grid must be rebuilt.
pub struct SettingsController {
    store: Arc<dyn SettingsStore>,
    active: MosaicSettings,
}

impl SettingsController {
    pub fn new(store: Arc<dyn SettingsStore>, initial: MosaicSettings) -> Self {
        Self {
            store,
            active: initial,
        }
    }

    pub fn active(&self) -> &MosaicSettings {
        &self.active
    }

    pub fn cell_size(&self) -> (u32, u32) {
        self.active.cell_size()
    }

    /// Adopt the stored settings, if any.
    ///
    /// A missing, unreadable or invalid record leaves the current (default)
    /// settings in place; startup never fails on bad settings.
    pub fn load(&mut self) -> &MosaicSettings {
        match self.store.load() {
            Ok(Some(stored)) => match stored.validate() {
                Ok(()) => {
                    info!(
                        grid_w = stored.grid_size.0,
                        grid_h = stored.grid_size.1,
                        "settings loaded"
                    );
                    self.active = MosaicSettings {
                        regenerate_existing: false,
                        ..stored
                    };
                }
                Err(e) => warn!(error = %e, "stored settings rejected, using defaults"),
            },
            Ok(None) => info!("no stored settings, using defaults"),
            Err(e) => warn!(error = %e, "failed to load settings, using defaults"),
        }
        &self.active
    }

    /// Apply a new settings record, rebuilding `grid` when needed.
    ///
    /// `grid` may be empty when the active emblem could not be read; a
    /// rebuild installs the new grid, a display-only change leaves it empty.
    /// Returns whether the grid was rebuilt. On error nothing changes: the
    /// store, the active settings and the grid all keep their old values.
    pub fn apply(
        &mut self,
        next: MosaicSettings,
        grid: &mut Option<Grid>,
        backend: &dyn ImageBackend,
    ) -> Result<bool> {
        next.validate()?;
        let rebuild = self.active.needs_rebuild(&next);

        let fresh = if rebuild {
            Some(build_grid(
                backend,
                &next.emblem_path,
                next.grid_size,
                next.output_size,
            )?)
        } else {
            None
        };

        self.store.save(&next)?;
        let (cw, ch) = next.cell_size();
        info!(
            grid_w = next.grid_size.0,
            grid_h = next.grid_size.1,
            cell_w = cw,
            cell_h = ch,
            rebuild,
            "settings applied"
        );
        self.active = MosaicSettings {
            regenerate_existing: false,
            ..next
        };
        if let Some(fresh) = fresh {
            install_grid(grid, fresh);
        }
        Ok(rebuild)
    }
}
