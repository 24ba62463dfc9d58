//! Cell selection for incoming photos.
//!
//! While empty cells remain, a photo goes to the empty cell whose tone is
//! closest to the photo's:
//!
//! ```text
//! score = 0.7 · |cell.brightness − photo.brightness|
//!       + 0.3 · |cell.contrast   − photo.contrast|
//! ```
//!
//! Once every cell is occupied, the photo evicts whichever occupant has been
//! there longest (smallest stamp). Both rules break ties by row-major order,
//! so the same grid and the same photo always pick the same cell.

use crate::error::{MosaicError, Result};
use crate::grid::{Cell, Grid};
use crate::imaging::Tone;
use tracing::{debug, info};

pub const BRIGHTNESS_WEIGHT: f64 = 0.7;
pub const CONTRAST_WEIGHT: f64 = 0.3;

/// Outcome of placing one photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub photo_id: String,
    /// Photo that previously held the cell, if the grid was full.
    pub evicted: Option<String>,
    pub stamp: u64,
    /// Generation of the grid the placement was made in.
    pub generation: u64,
}

/// Weighted tone distance; lower is a better match.
pub fn score(cell: &Cell, tone: &Tone) -> f64 {
    BRIGHTNESS_WEIGHT * (cell.brightness - tone.brightness).abs()
        + CONTRAST_WEIGHT * (cell.contrast - tone.contrast).abs()
}

/// Index of the cell a photo with `tone` would be placed in.
///
/// `None` only for an empty grid.
pub fn select_cell(grid: &Grid, tone: &Tone) -> Option<usize> {
    let best_empty = grid
        .cells()
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_assigned())
        .fold(None::<(usize, f64)>, |best, (i, c)| {
            let s = score(c, tone);
            match best {
                Some((_, best_score)) if best_score <= s => best,
                _ => Some((i, s)),
            }
        });
    if let Some((index, _)) = best_empty {
        return Some(index);
    }

    grid.cells()
        .iter()
        .enumerate()
        .fold(None::<(usize, u64)>, |oldest, (i, c)| match oldest {
            Some((_, stamp)) if stamp <= c.last_assigned => oldest,
            _ => Some((i, c.last_assigned)),
        })
        .map(|(index, _)| index)
}

/// Place `photo_id` into the best cell and stamp it.
pub fn assign(grid: &mut Grid, photo_id: &str, tone: &Tone) -> Result<Placement> {
    let index = select_cell(grid, tone)
        .ok_or_else(|| MosaicError::Validation("assignment into an empty grid".into()))?;
    let stamp = grid.next_stamp();
    let generation = grid.generation();
    let cell = grid
        .cell_mut(index)
        .ok_or_else(|| MosaicError::Validation(format!("cell index {index}")))?;

    let evicted = cell.photo_id.replace(photo_id.to_string());
    cell.last_assigned = stamp;

    match &evicted {
        Some(old) => info!(
            photo = photo_id,
            evicted = %old,
            x = cell.x,
            y = cell.y,
            "photo placed over oldest cell"
        ),
        None => debug!(
            photo = photo_id,
            x = cell.x,
            y = cell.y,
            brightness = tone.brightness,
            contrast = tone.contrast,
            "photo placed in empty cell"
        ),
    }

    Ok(Placement {
        x: cell.x,
        y: cell.y,
        photo_id: photo_id.to_string(),
        evicted,
        stamp,
        generation,
    })
}
