//! Brightness/contrast grid built from the emblem image.
//!
//! The emblem is resampled to exactly `W×H` pixels and converted to
//! grayscale; each pixel becomes one [`Cell`]. A cell's brightness is its
//! sampled luma. Its contrast is the population standard deviation of the
//! luma of its grid neighbours (up to 8, out-of-bounds positions excluded,
//! the cell itself excluded). Cells with fewer than two neighbours have zero
//! contrast.
//!
//! A grid is never edited structurally: any change to grid size, output size
//! or emblem produces a new grid via [`build_grid`], which then replaces the
//! old one through [`Grid::supersede`].

use crate::error::{MosaicError, Result};
use crate::imaging::{ImageBackend, Tone, calculate_cell_size, mean_and_std_dev};
use std::path::Path;
use tracing::{debug, info};

/// One tile slot of the mosaic.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
    pub brightness: f64,
    pub contrast: f64,
    pub photo_id: Option<String>,
    /// Logical stamp of the latest assignment, 0 if never assigned.
    pub last_assigned: u64,
}

impl Cell {
    fn empty(x: u32, y: u32, brightness: f64, contrast: f64) -> Self {
        Self {
            x,
            y,
            brightness,
            contrast,
            photo_id: None,
            last_assigned: 0,
        }
    }

    pub fn tone(&self) -> Tone {
        Tone {
            brightness: self.brightness,
            contrast: self.contrast,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.photo_id.is_some()
    }
}

/// The cell map in row-major order plus the geometry it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
    output_size: (u32, u32),
    cell_size: (u32, u32),
    generation: u64,
    clock: u64,
}

impl Grid {
    /// Build a grid from luma samples already reduced to `grid_size`.
    pub fn from_luma(luma: &[u8], grid_size: (u32, u32), output_size: (u32, u32)) -> Result<Self> {
        validate_dims("grid size", grid_size)?;
        validate_dims("output size", output_size)?;
        let (width, height) = grid_size;
        let expected = width as usize * height as usize;
        if luma.len() != expected {
            return Err(MosaicError::Validation(format!(
                "emblem sample of {} values for a {width}x{height} grid",
                luma.len()
            )));
        }

        let mut cells = Vec::with_capacity(expected);
        for y in 0..height {
            for x in 0..width {
                let brightness = luma[(y * width + x) as usize] as f64;
                let contrast = neighbour_contrast(luma, width, height, x, y);
                cells.push(Cell::empty(x, y, brightness, contrast));
            }
        }

        Ok(Self {
            width,
            height,
            cells,
            output_size,
            cell_size: calculate_cell_size(output_size, grid_size),
            generation: 0,
            clock: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Nominal cell size in pixels, `output / grid` per axis.
    pub fn cell_size(&self) -> (u32, u32) {
        self.cell_size
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    /// Rebuild counter; bumped every time this grid is superseded.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, x: u32, y: u32) -> Option<&Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get((y * self.width + x) as usize)
    }

    pub fn assigned_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_assigned()).count()
    }

    pub(crate) fn cell_mut(&mut self, index: usize) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    /// Advance the logical clock and return the new stamp.
    pub(crate) fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    #[cfg(test)]
    pub(crate) fn empty_for_test() -> Self {
        Self {
            width: 0,
            height: 0,
            cells: Vec::new(),
            output_size: (0, 0),
            cell_size: (0, 0),
            generation: 0,
            clock: 0,
        }
    }

    /// Replace this grid wholesale with `next`, carrying the generation forward.
    pub fn supersede(&mut self, mut next: Grid) {
        next.generation = self.generation + 1;
        debug!(
            from = self.generation,
            to = next.generation,
            "grid superseded"
        );
        *self = next;
    }
}

/// Put `fresh` in `slot`, superseding the grid already there.
pub fn install_grid(slot: &mut Option<Grid>, fresh: Grid) {
    match slot.as_mut() {
        Some(grid) => grid.supersede(fresh),
        None => *slot = Some(fresh),
    }
}

/// Sample the emblem and build a fresh grid.
///
/// Dimensions are checked before the emblem is touched. Any failure to read
/// the emblem is fatal and reported as [`MosaicError::EmblemUnreadable`].
pub fn build_grid(
    backend: &dyn ImageBackend,
    emblem: &Path,
    grid_size: (u32, u32),
    output_size: (u32, u32),
) -> Result<Grid> {
    validate_dims("grid size", grid_size)?;
    validate_dims("output size", output_size)?;

    let luma = backend
        .sample_luma(emblem, grid_size.0, grid_size.1)
        .map_err(|source| MosaicError::EmblemUnreadable {
            path: emblem.to_path_buf(),
            source,
        })?;
    let grid = Grid::from_luma(&luma, grid_size, output_size)?;
    info!(
        emblem = %emblem.display(),
        width = grid_size.0,
        height = grid_size.1,
        cell_w = grid.cell_size.0,
        cell_h = grid.cell_size.1,
        "grid built"
    );
    Ok(grid)
}

fn validate_dims(what: &str, (w, h): (u32, u32)) -> Result<()> {
    if w == 0 || h == 0 {
        return Err(MosaicError::Validation(format!("{what} {w}x{h}")));
    }
    Ok(())
}

/// Standard deviation of the luma of the in-bounds 8-neighbourhood of `(x, y)`.
pub fn neighbour_contrast(luma: &[u8], width: u32, height: u32, x: u32, y: u32) -> f64 {
    let mut neighbours = Vec::with_capacity(8);
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            neighbours.push(luma[(ny * width as i64 + nx) as usize] as f64);
        }
    }
    if neighbours.len() < 2 {
        return 0.0;
    }
    mean_and_std_dev(neighbours.iter().copied()).1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};

    #[test]
    fn grid_has_one_cell_per_sample_in_row_major_order() {
        let grid = Grid::from_luma(&[10, 200, 50, 220], (2, 2), (100, 100)).unwrap();
        let coords: Vec<_> = grid.cells().iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
        let brightness: Vec<_> = grid.cells().iter().map(|c| c.brightness).collect();
        assert_eq!(brightness, vec![10.0, 200.0, 50.0, 220.0]);
        assert!(grid.cells().iter().all(|c| !c.is_assigned() && c.last_assigned == 0));
    }

    #[test]
    fn corner_contrast_uses_three_neighbours() {
        // Neighbours of (0,0) in a 2x2 grid are 200, 50, 220
        let c = neighbour_contrast(&[10, 200, 50, 220], 2, 2, 0, 0);
        let mean = (200.0 + 50.0 + 220.0) / 3.0;
        let var = ((200.0f64 - mean).powi(2) + (50.0f64 - mean).powi(2) + (220.0f64 - mean).powi(2))
            / 3.0;
        assert!((c - var.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn single_neighbour_has_zero_contrast() {
        assert_eq!(neighbour_contrast(&[0, 255], 2, 1, 0, 0), 0.0);
        assert_eq!(neighbour_contrast(&[128], 1, 1, 0, 0), 0.0);
    }

    #[test]
    fn uniform_region_has_zero_contrast() {
        let grid = Grid::from_luma(&[90; 9], (3, 3), (90, 90)).unwrap();
        assert!(grid.cells().iter().all(|c| c.contrast == 0.0));
    }

    #[test]
    fn center_cell_ignores_its_own_value() {
        let mut luma = [100u8; 9];
        luma[4] = 0;
        assert_eq!(neighbour_contrast(&luma, 3, 3, 1, 1), 0.0);
    }

    #[test]
    fn cell_size_follows_output_over_grid() {
        let grid = Grid::from_luma(&[0; 30 * 40], (30, 40), (1200, 1600)).unwrap();
        assert_eq!(grid.cell_size(), (40, 40));
        assert_eq!(grid.cells().len(), 1200);
    }

    #[test]
    fn zero_grid_is_validation_failure() {
        let backend = MockBackend::with_luma(vec![]);
        let err = build_grid(&backend, Path::new("/emblem.png"), (0, 5), (100, 100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn missing_emblem_propagates_not_found() {
        let backend = MockBackend::new();
        let err = build_grid(&backend, Path::new("/gone.png"), (4, 4), (100, 100)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn build_grid_samples_emblem_at_grid_size() {
        let backend = MockBackend::with_luma(vec![10, 200, 50, 220]);
        let grid = build_grid(&backend, Path::new("/emblem.png"), (2, 2), (100, 100)).unwrap();
        assert_eq!(grid.dimensions(), (2, 2));
        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::SampleLuma {
                source: "/emblem.png".into(),
                width: 2,
                height: 2,
            }]
        );
    }

    #[test]
    fn supersede_bumps_generation() {
        let mut grid = Grid::from_luma(&[1, 2], (2, 1), (20, 10)).unwrap();
        assert_eq!(grid.generation(), 0);
        grid.supersede(Grid::from_luma(&[5; 4], (2, 2), (20, 20)).unwrap());
        assert_eq!(grid.generation(), 1);
        assert_eq!(grid.dimensions(), (2, 2));
    }

    #[test]
    fn cell_lookup_is_bounds_checked() {
        let grid = Grid::from_luma(&[1, 2, 3, 4, 5, 6], (3, 2), (30, 20)).unwrap();
        assert_eq!(grid.cell(2, 1).map(|c| c.brightness), Some(6.0));
        assert!(grid.cell(3, 0).is_none());
    }
}
