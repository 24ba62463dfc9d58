//! # Candle Mosaic
//!
//! A live photo-mosaic engine for events. An emblem image is divided into a
//! grid of cells; every photo a guest submits is cropped square, measured,
//! and placed in the cell whose tone it matches best. Once the grid is full,
//! the cell held longest is replaced, so the mosaic keeps changing for the
//! whole evening.
//!
//! # Architecture: One Service, Explicit Wiring
//!
//! ```text
//! upload ─► storage ─► catalog ─► crop ─► assign ─► render ─► notify
//!              ▲                            │
//!   drop folder┘ (sync)             grid (under lock)
//! ```
//!
//! Everything stateful lives in one [`service::MosaicService`], constructed
//! by the CLI from its parts: an image backend, a catalog, a settings store,
//! the file areas, and a notifier. There are no globals. Tests build the same
//! service from in-memory parts.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`grid`] | Builds the cell grid from the emblem: brightness and neighbour contrast per cell |
//! | [`assign`] | Picks the best cell for a photo's tone, evicting the oldest when full |
//! | [`render`] | Paints the grid into the output image and publishes its URL |
//! | [`settings`] | Grid/output sizes, emblem path and titles; validation and live apply |
//! | [`sync`] | Reconciles uploads, processed crops, drop folder and catalog |
//! | [`notify`] | In-process topic broadcast with replayed history |
//! | [`service`] | The engine: owns grid and settings, runs ingestion and rendering |
//! | [`worker`] | Background render thread with request coalescing |
//! | [`catalog`] | Photo records and the catalog trait |
//! | [`db`] | SQLite catalog and settings store |
//! | [`storage`] | Upload, processed and drop-folder file areas |
//! | [`naming`] | `<id>_<original>` stored file names |
//! | [`imaging`] | Pure-Rust image operations: decode, crop, tone, composite |
//! | [`config`] | `mosaic.toml` loading and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Error type and failure kinds |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Tone Matching
//!
//! A cell's tone is the mean luma of its emblem pixel and the standard
//! deviation of its neighbours. A photo's tone is its own mean luma and
//! spread. Brightness counts for 70% of the match, contrast for 30%. Empty
//! cells always win over assigned ones; among assigned cells the one
//! assigned longest ago is replaced, ignoring tone.
//!
//! ## Logical Clock
//!
//! Assignment order is stamped with a counter owned by the grid, not the
//! wall clock. Two photos placed in the same millisecond still have a strict
//! order, and a clock jump cannot make a fresh cell look old.
//!
//! ## Snapshot Rendering
//!
//! Painting a 1000×1000 canvas takes far longer than an assignment. The
//! renderer clones the grid under the lock and paints outside it; each grid
//! rebuild bumps a generation counter, and a snapshot from an older
//! generation is repainted before it is written.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for decoding, cropping and
//! JPEG encoding. No ImageMagick, no system libraries: the binary is
//! self-contained.

pub mod assign;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod grid;
pub mod imaging;
pub mod logging;
pub mod naming;
pub mod notify;
pub mod output;
pub mod render;
pub mod service;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;
