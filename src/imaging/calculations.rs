//! Pure calculation functions for image geometry and tone.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Tone;

/// Integer cell size per axis: `output / grid`.
///
/// This is the *nominal* cell size used for crop aspect and reporting. The
/// renderer does not paint with it; see [`cell_span`].
///
/// # Examples
/// ```
/// # use candle_mosaic::imaging::calculate_cell_size;
/// assert_eq!(calculate_cell_size((1000, 1000), (20, 20)), (50, 50));
/// assert_eq!(calculate_cell_size((1000, 1000), (30, 30)), (33, 33));
/// ```
pub fn calculate_cell_size(output: (u32, u32), grid: (u32, u32)) -> (u32, u32) {
    let (out_w, out_h) = output;
    let (grid_w, grid_h) = grid;
    (out_w / grid_w.max(1), out_h / grid_h.max(1))
}

/// Pixel span `[start, end)` of cell `index` along one axis.
///
/// Uses floating-point division so the spans tile the axis exactly: cells
/// differ in size by at most one pixel and the last cell ends at `total`.
///
/// # Examples
/// ```
/// # use candle_mosaic::imaging::cell_span;
/// // 1000px across 3 cells → 333, 333, 334
/// assert_eq!(cell_span(0, 3, 1000), (0, 333));
/// assert_eq!(cell_span(1, 3, 1000), (333, 666));
/// assert_eq!(cell_span(2, 3, 1000), (666, 1000));
/// ```
pub fn cell_span(index: u32, count: u32, total: u32) -> (u32, u32) {
    let step = total as f64 / count.max(1) as f64;
    let start = (index as f64 * step).floor() as u32;
    let end = if index + 1 >= count {
        total
    } else {
        ((index + 1) as f64 * step).floor() as u32
    };
    (start.min(total), end.min(total))
}

/// A rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest centered region of `source` with the given aspect ratio.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `aspect` - Target aspect ratio as (width, height)
///
/// # Returns
/// * The crop rectangle; one dimension always matches the source exactly.
pub fn calculate_crop_region(source: (u32, u32), aspect: (u32, u32)) -> CropRegion {
    let (src_w, src_h) = source;
    let (aspect_w, aspect_h) = (aspect.0.max(1), aspect.1.max(1));

    let src_aspect = src_w as f64 / src_h.max(1) as f64;
    let tgt_aspect = aspect_w as f64 / aspect_h as f64;

    let (width, height) = if src_aspect > tgt_aspect {
        // Source is wider: keep full height, trim the sides
        let w = ((src_h as f64 * tgt_aspect).round() as u32).clamp(1, src_w.max(1));
        (w, src_h)
    } else {
        // Source is taller: keep full width, trim top and bottom
        let h = ((src_w as f64 / tgt_aspect).round() as u32).clamp(1, src_h.max(1));
        (src_w, h)
    };

    CropRegion {
        x: (src_w - width.min(src_w)) / 2,
        y: (src_h - height.min(src_h)) / 2,
        width,
        height,
    }
}

/// Mean and population standard deviation of luma samples.
///
/// An empty slice has a tone of zero brightness and zero contrast.
pub fn luma_tone(samples: &[u8]) -> Tone {
    if samples.is_empty() {
        return Tone::default();
    }
    let values = samples.iter().map(|&v| v as f64);
    let (mean, contrast) = mean_and_std_dev(values);
    Tone {
        brightness: mean,
        contrast,
    }
}

/// Mean and population standard deviation of a set of values.
pub(crate) fn mean_and_std_dev(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let (count, sum) = values.clone().fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // calculate_cell_size tests
    // =========================================================================

    #[test]
    fn cell_size_exact_division() {
        assert_eq!(calculate_cell_size((1200, 1600), (30, 40)), (40, 40));
    }

    #[test]
    fn cell_size_truncates() {
        assert_eq!(calculate_cell_size((1000, 1000), (30, 30)), (33, 33));
    }

    #[test]
    fn cell_size_zero_grid_does_not_divide_by_zero() {
        assert_eq!(calculate_cell_size((1000, 800), (0, 0)), (1000, 800));
    }

    // =========================================================================
    // cell_span tests
    // =========================================================================

    #[test]
    fn spans_tile_axis_without_gaps() {
        let count = 7;
        let total = 1000;
        let mut expected_start = 0;
        for i in 0..count {
            let (start, end) = cell_span(i, count, total);
            assert_eq!(start, expected_start, "gap before cell {i}");
            assert!(end > start);
            expected_start = end;
        }
        assert_eq!(expected_start, total);
    }

    #[test]
    fn spans_differ_by_at_most_one_pixel() {
        let widths: Vec<u32> = (0..30)
            .map(|i| {
                let (s, e) = cell_span(i, 30, 1000);
                e - s
            })
            .collect();
        let min = *widths.iter().min().unwrap();
        let max = *widths.iter().max().unwrap();
        assert!(max - min <= 1, "widths {widths:?}");
    }

    #[test]
    fn single_cell_spans_everything() {
        assert_eq!(cell_span(0, 1, 640), (0, 640));
    }

    // =========================================================================
    // calculate_crop_region tests
    // =========================================================================

    #[test]
    fn crop_landscape_to_square() {
        // 800x600 → 600x600 centered horizontally
        assert_eq!(
            calculate_crop_region((800, 600), (1, 1)),
            CropRegion {
                x: 100,
                y: 0,
                width: 600,
                height: 600
            }
        );
    }

    #[test]
    fn crop_portrait_to_square() {
        // 600x900 → 600x600 centered vertically
        assert_eq!(
            calculate_crop_region((600, 900), (50, 50)),
            CropRegion {
                x: 0,
                y: 150,
                width: 600,
                height: 600
            }
        );
    }

    #[test]
    fn crop_to_wide_cell_aspect() {
        // 400x400 → 2:1 cell → 400x200
        assert_eq!(
            calculate_crop_region((400, 400), (40, 20)),
            CropRegion {
                x: 0,
                y: 100,
                width: 400,
                height: 200
            }
        );
    }

    #[test]
    fn crop_matching_aspect_is_identity() {
        assert_eq!(
            calculate_crop_region((300, 200), (3, 2)),
            CropRegion {
                x: 0,
                y: 0,
                width: 300,
                height: 200
            }
        );
    }

    // =========================================================================
    // luma_tone tests
    // =========================================================================

    #[test]
    fn tone_of_uniform_samples_has_zero_contrast() {
        let tone = luma_tone(&[205; 16]);
        assert_eq!(tone.brightness, 205.0);
        assert_eq!(tone.contrast, 0.0);
    }

    #[test]
    fn tone_uses_population_std_dev() {
        // values 0 and 200 → mean 100, population std 100
        let tone = luma_tone(&[0, 200, 0, 200]);
        assert_eq!(tone.brightness, 100.0);
        assert_eq!(tone.contrast, 100.0);
    }

    #[test]
    fn tone_of_empty_is_zero() {
        assert_eq!(luma_tone(&[]), Tone::default());
    }
}
