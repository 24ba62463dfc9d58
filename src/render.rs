//! Full-canvas composite rendering.
//!
//! Every render repaints the whole canvas from the grid:
//!
//! - **Assigned cell**: the photo's processed file, resized to the cell's
//!   exact pixel span and pasted.
//! - **Unassigned cell**: solid gray at the cell's brightness.
//! - **Assigned cell whose tile fails to load**: logged and left unpainted.
//!
//! Cell spans come from [`cell_span`], so the cells tile the output exactly
//! and the last row and column end on the canvas edge.
//!
//! Tile decoding is the expensive part and runs in parallel with
//! [rayon](https://docs.rs/rayon); pasting into the canvas is sequential.
//! After the file is written the public URL is published on
//! [`MOSAIC_TOPIC`](crate::notify::MOSAIC_TOPIC).

use crate::catalog::ImageCatalog;
use crate::error::Result;
use crate::grid::Grid;
use crate::imaging::{ImageBackend, Quality, cell_span};
use crate::notify::Notifier;
use crate::storage::FileStorage;
use image::{Rgb, RgbImage, imageops};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub const DEFAULT_RENDER_QUALITY: u32 = 95;

/// Where the composite goes and how it is announced.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub output_path: PathBuf,
    /// URL subscribers use to fetch the composite.
    pub public_url: String,
    pub quality: Quality,
}

/// Resolves a photo id to the processed file painted into its cell.
pub trait TileLookup {
    /// `Ok(None)` when the photo is unknown.
    fn tile_path(&self, photo_id: &str) -> Result<Option<PathBuf>>;
}

/// Tile lookup through the catalog's file name and the processed area.
pub struct CatalogTiles<'a> {
    pub catalog: &'a dyn ImageCatalog,
    pub storage: &'a FileStorage,
}

impl TileLookup for CatalogTiles<'_> {
    fn tile_path(&self, photo_id: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .catalog
            .filename(photo_id)?
            .map(|name| self.storage.processed_photo_path(photo_id, &name)))
    }
}

/// Cell counts of one paint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaintStats {
    /// Cells painted with a photo.
    pub painted: usize,
    /// Unassigned cells filled with gray.
    pub filled: usize,
    /// Assigned cells left unpainted because the tile was unavailable.
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    pub stats: PaintStats,
    pub output_path: PathBuf,
    pub url: String,
    /// Generation of the grid snapshot that was painted.
    pub generation: u64,
}

/// One cell's rectangle on the canvas.
struct Span {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

enum CellPaint {
    Gray(u8),
    Tile { photo_id: String, path: PathBuf },
    Missing,
}

/// Paint the grid onto a fresh canvas of the grid's output size.
pub fn paint(grid: &Grid, tiles: &dyn TileLookup, backend: &dyn ImageBackend) -> (RgbImage, PaintStats) {
    let (out_w, out_h) = grid.output_size();
    let (grid_w, grid_h) = grid.dimensions();
    let mut canvas = RgbImage::new(out_w, out_h);
    let mut stats = PaintStats::default();

    // Resolve tile paths up front; the catalog is not shared with rayon
    let mut jobs = Vec::with_capacity(grid.cells().len());
    for cell in grid.cells() {
        let (x1, x2) = cell_span(cell.x, grid_w, out_w);
        let (y1, y2) = cell_span(cell.y, grid_h, out_h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        let span = Span {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        };
        let paint = match &cell.photo_id {
            None => CellPaint::Gray(cell.brightness.round().clamp(0.0, 255.0) as u8),
            Some(id) => match tiles.tile_path(id) {
                Ok(Some(path)) => CellPaint::Tile {
                    photo_id: id.clone(),
                    path,
                },
                Ok(None) => {
                    warn!(photo = %id, x = cell.x, y = cell.y, "assigned photo not in catalog");
                    CellPaint::Missing
                }
                Err(e) => {
                    error!(photo = %id, error = %e, "tile lookup failed");
                    CellPaint::Missing
                }
            },
        };
        jobs.push((span, paint));
    }

    let loaded: Vec<Option<RgbImage>> = jobs
        .par_iter()
        .map(|(span, paint)| match paint {
            CellPaint::Tile { photo_id, path } => {
                match backend.load_tile(path, span.width, span.height) {
                    Ok(tile) => Some(tile),
                    Err(e) => {
                        error!(photo = %photo_id, path = %path.display(), error = %e, "tile load failed");
                        None
                    }
                }
            }
            _ => None,
        })
        .collect();

    for ((span, paint), tile) in jobs.iter().zip(loaded) {
        match (paint, tile) {
            (CellPaint::Gray(level), _) => {
                let block = RgbImage::from_pixel(span.width, span.height, Rgb([*level; 3]));
                imageops::replace(&mut canvas, &block, span.x as i64, span.y as i64);
                stats.filled += 1;
            }
            (CellPaint::Tile { .. }, Some(tile)) => {
                imageops::replace(&mut canvas, &tile, span.x as i64, span.y as i64);
                stats.painted += 1;
            }
            (CellPaint::Tile { .. }, None) | (CellPaint::Missing, _) => stats.missing += 1,
        }
    }

    debug!(
        painted = stats.painted,
        filled = stats.filled,
        missing = stats.missing,
        "canvas painted"
    );
    (canvas, stats)
}

/// Paint, write the composite to the target path, and publish its URL.
pub fn render(
    grid: &Grid,
    tiles: &dyn TileLookup,
    backend: &dyn ImageBackend,
    target: &RenderTarget,
    notifier: &Notifier,
) -> Result<RenderReport> {
    let (canvas, stats) = paint(grid, tiles, backend);
    write_and_publish(&canvas, stats, grid.generation(), backend, target, notifier)
}

pub(crate) fn write_and_publish(
    canvas: &RgbImage,
    stats: PaintStats,
    generation: u64,
    backend: &dyn ImageBackend,
    target: &RenderTarget,
    notifier: &Notifier,
) -> Result<RenderReport> {
    backend.write_composite(canvas, &target.output_path, target.quality)?;
    let delivered = notifier.publish_mosaic_updated(&target.public_url);
    info!(
        path = %target.output_path.display(),
        painted = stats.painted,
        missing = stats.missing,
        subscribers = delivered,
        "mosaic rendered"
    );
    Ok(RenderReport {
        stats,
        output_path: target.output_path.clone(),
        url: target.public_url.clone(),
        generation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::assign;
    use crate::imaging::Tone;
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::notify::{MOSAIC_TOPIC, mosaic_updated};
    use std::collections::HashMap;

    struct MapTiles(HashMap<String, PathBuf>);

    impl TileLookup for MapTiles {
        fn tile_path(&self, photo_id: &str) -> Result<Option<PathBuf>> {
            Ok(self.0.get(photo_id).cloned())
        }
    }

    fn target() -> RenderTarget {
        RenderTarget {
            output_path: "/out/current_mosaic.jpg".into(),
            public_url: "/static/output/current_mosaic.jpg".into(),
            quality: Quality::new(DEFAULT_RENDER_QUALITY),
        }
    }

    fn sample_grid() -> Grid {
        Grid::from_luma(&[10, 200, 50, 220], (2, 2), (100, 100)).unwrap()
    }

    #[test]
    fn empty_grid_paints_emblem_grays() {
        let backend = MockBackend::new();
        let (canvas, stats) = paint(&sample_grid(), &MapTiles(HashMap::new()), &backend);

        assert_eq!(canvas.dimensions(), (100, 100));
        assert_eq!(canvas.get_pixel(25, 25).0, [10; 3]);
        assert_eq!(canvas.get_pixel(75, 25).0, [200; 3]);
        assert_eq!(canvas.get_pixel(25, 75).0, [50; 3]);
        assert_eq!(canvas.get_pixel(99, 99).0, [220; 3]);
        assert_eq!(stats.filled, 4);
    }

    #[test]
    fn assigned_cell_gets_tile_and_others_stay_gray() {
        let mut grid = sample_grid();
        let placement = assign(
            &mut grid,
            "p1",
            &Tone {
                brightness: 205.0,
                contrast: 0.0,
            },
        )
        .unwrap();
        assert_eq!((placement.x, placement.y), (1, 0));

        let backend = MockBackend::new();
        backend.set_tile("p1_a.jpg", [255, 0, 0]);
        let tiles = MapTiles(HashMap::from([(
            "p1".to_string(),
            PathBuf::from("/processed/p1_a.jpg"),
        )]));
        let notifier = Notifier::default();
        let rx = notifier.subscribe(MOSAIC_TOPIC);

        let report = render(&grid, &tiles, &backend, &target(), &notifier).unwrap();
        assert_eq!(
            report.stats,
            PaintStats {
                painted: 1,
                filled: 3,
                missing: 0,
            }
        );

        let canvas = backend.written_canvas().unwrap();
        assert_eq!(canvas.get_pixel(75, 25).0, [255, 0, 0]);
        assert_eq!(canvas.get_pixel(50, 0).0, [255, 0, 0]);
        assert_eq!(canvas.get_pixel(25, 25).0, [10; 3]);
        assert_eq!(canvas.get_pixel(25, 75).0, [50; 3]);
        assert_eq!(canvas.get_pixel(75, 75).0, [220; 3]);

        assert!(backend.get_operations().contains(&RecordedOp::LoadTile {
            source: "/processed/p1_a.jpg".into(),
            width: 50,
            height: 50,
        }));
        assert_eq!(
            rx.try_recv().unwrap().payload,
            mosaic_updated("/static/output/current_mosaic.jpg")
        );
    }

    #[test]
    fn unavailable_tiles_are_left_unpainted() {
        let mut grid = sample_grid();
        let tone = Tone::default();
        assign(&mut grid, "not-cataloged", &tone).unwrap();
        assign(&mut grid, "no-file", &tone).unwrap();

        let backend = MockBackend::new();
        let tiles = MapTiles(HashMap::from([(
            "no-file".to_string(),
            PathBuf::from("/processed/no-file_x.jpg"),
        )]));
        let (canvas, stats) = paint(&grid, &tiles, &backend);

        assert_eq!(stats.missing, 2);
        assert_eq!(stats.filled, 2);
        // Both dark photos land in the dark column
        assert_eq!(canvas.get_pixel(25, 25).0, [0; 3]);
        assert_eq!(canvas.get_pixel(25, 75).0, [0; 3]);
    }

    #[test]
    fn uneven_spans_cover_the_whole_canvas() {
        let grid = Grid::from_luma(&[255; 9], (3, 3), (100, 100)).unwrap();
        let (canvas, stats) = paint(&grid, &MapTiles(HashMap::new()), &MockBackend::new());
        assert_eq!(stats.filled, 9);
        assert!(canvas.pixels().all(|p| p.0 == [255; 3]));
    }

    #[test]
    fn grid_finer_than_output_skips_empty_spans() {
        let grid = Grid::from_luma(&[255; 4], (4, 1), (2, 1)).unwrap();
        let (canvas, stats) = paint(&grid, &MapTiles(HashMap::new()), &MockBackend::new());
        assert_eq!(canvas.dimensions(), (2, 1));
        assert_eq!(stats.filled, 2);
    }

    #[test]
    fn render_writes_real_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let tile_path = tmp.path().join("p1_a.png");
        crate::test_helpers::write_gray_png(&tile_path, 30, 30, 240);

        let mut grid = Grid::from_luma(&[10, 200, 50, 220, 90, 120], (3, 2), (90, 40)).unwrap();
        assign(&mut grid, "p1", &Tone::default()).unwrap();
        let tiles = MapTiles(HashMap::from([("p1".to_string(), tile_path)]));
        let target = RenderTarget {
            output_path: tmp.path().join("output").join("current_mosaic.jpg"),
            ..target()
        };

        let backend = RustBackend::new();
        let report = render(&grid, &tiles, &backend, &target, &Notifier::default()).unwrap();
        assert_eq!(report.stats.painted, 1);
        let dims = backend_dims(&backend, &target.output_path);
        assert_eq!(dims, (90, 40));
    }

    fn backend_dims(backend: &RustBackend, path: &std::path::Path) -> (u32, u32) {
        let d = backend.identify(path).unwrap();
        (d.width, d.height)
    }
}
