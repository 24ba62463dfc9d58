//! CLI output formatting for every command.
//!
//! # Output Format
//!
//! ## Sync
//!
//! ```text
//! Sync
//!     Drop folder: 2 ingested
//!     Catalog: 3 added
//!     Processed: 2 cropped
//!     Errors: 0
//! ```
//!
//! ## Add
//!
//! ```text
//! 001 party.jpg → cell (4, 7)
//! 002 selfie.png → cell (0, 0), replaced 3f2a…
//! ```
//!
//! ## Render
//!
//! ```text
//! Mosaic → static/output/current_mosaic.jpg
//!     Published: /static/output/current_mosaic.jpg
//!     Cells: 12 photos, 388 gray, 0 missing
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::assign::Placement;
use crate::grid::Grid;
use crate::notify::Event;
use crate::render::RenderReport;
use crate::service::RegenerateReport;
use crate::settings::MosaicSettings;
use crate::sync::SyncReport;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn pair((a, b): (u32, u32)) -> String {
    format!("{a}x{b}")
}

// ============================================================================
// Sync
// ============================================================================

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    vec![
        "Sync".to_string(),
        format!("{}Drop folder: {} ingested", indent(1), report.drop_ingested),
        format!("{}Catalog: {} added", indent(1), report.cataloged),
        format!("{}Processed: {} cropped", indent(1), report.processed),
        format!("{}Errors: {}", indent(1), report.errors),
    ]
}

pub fn print_sync_report(report: &SyncReport) {
    print_lines(format_sync_report(report));
}

// ============================================================================
// Settings
// ============================================================================

pub fn format_settings(settings: &MosaicSettings) -> Vec<String> {
    let (cw, ch) = settings.cell_size();
    vec![
        "Settings".to_string(),
        format!("{}Title: {}", indent(1), settings.title),
        format!("{}Subtitle: {}", indent(1), settings.subtitle),
        format!("{}Grid: {} cells", indent(1), pair(settings.grid_size)),
        format!("{}Output: {} px", indent(1), pair(settings.output_size)),
        format!("{}Cell: {cw}x{ch} px", indent(1)),
        format!("{}Emblem: {}", indent(1), settings.emblem_path.display()),
    ]
}

pub fn print_settings(settings: &MosaicSettings) {
    print_lines(format_settings(settings));
}

/// One line describing the outcome of a settings change.
pub fn format_settings_applied(rebuilt: bool) -> String {
    if rebuilt {
        "Settings saved, grid rebuilt".to_string()
    } else {
        "Settings saved".to_string()
    }
}

// ============================================================================
// Placement
// ============================================================================

/// ```text
/// 001 party.jpg → cell (4, 7)
/// ```
pub fn format_placement(index: usize, name: &str, placement: &Placement) -> String {
    let mut line = format!(
        "{} {} \u{2192} cell ({}, {})",
        format_index(index),
        name,
        placement.x,
        placement.y
    );
    if let Some(evicted) = &placement.evicted {
        line.push_str(&format!(", replaced {evicted}"));
    }
    line
}

/// ```text
/// 002 broken.jpg: image error: ...
/// ```
pub fn format_failed_placement(index: usize, name: &str, error: &str) -> String {
    format!("{} {}: {}", format_index(index), name, error)
}

// ============================================================================
// Render
// ============================================================================

pub fn format_render_report(report: &RenderReport) -> Vec<String> {
    vec![
        format!("Mosaic \u{2192} {}", report.output_path.display()),
        format!("{}Published: {}", indent(1), report.url),
        format!(
            "{}Cells: {} photos, {} gray, {} missing",
            indent(1),
            report.stats.painted,
            report.stats.filled,
            report.stats.missing
        ),
    ]
}

pub fn print_render_report(report: &RenderReport) {
    print_lines(format_render_report(report));
}

pub fn format_regenerate_report(report: &RegenerateReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Regenerated: {} placed, {} failed",
        report.placed, report.failed
    )];
    lines.extend(format_render_report(&report.render));
    lines
}

pub fn print_regenerate_report(report: &RegenerateReport) {
    print_lines(format_regenerate_report(report));
}

// ============================================================================
// Stats and events
// ============================================================================

pub fn format_stats(participants: usize, grid: &Grid) -> Vec<String> {
    let total = grid.cells().len();
    let filled = grid.assigned_count();
    vec![
        "Mosaic".to_string(),
        format!("{}Participants: {}", indent(1), participants),
        format!("{}Grid: {} cells", indent(1), pair(grid.dimensions())),
        format!("{}Filled: {}/{}", indent(1), filled, total),
        format!("{}Generation: {}", indent(1), grid.generation()),
    ]
}

pub fn print_stats(participants: usize, grid: &Grid) {
    print_lines(format_stats(participants, grid));
}

/// `mosaic_updated` events show their path; anything else shows its JSON.
pub fn format_event(event: &Event) -> String {
    match (
        event.payload.get("action").and_then(|a| a.as_str()),
        event.payload.get("path").and_then(|p| p.as_str()),
    ) {
        (Some("mosaic_updated"), Some(path)) => format!("[{}] mosaic updated: {}", event.topic, path),
        _ => format!("[{}] {}", event.topic, event.payload),
    }
}
