//! Application configuration module.
//!
//! Handles loading and validating `mosaic.toml`. Every key is optional; a
//! missing file means stock defaults.
//!
//! ## Config File Location
//!
//! `mosaic.toml` lives in the config directory (`--config-dir`, default the
//! current directory). Relative paths inside it are resolved against that
//! directory:
//!
//! ```text
//! event/
//! ├── mosaic.toml
//! ├── mosaic.db
//! ├── uploads/
//! │   └── processed/
//! ├── self_uploads/
//! └── static/
//!     ├── base/emblem.png
//!     └── output/current_mosaic.jpg
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! upload_dir = "uploads"
//! processed_dir = "uploads/processed"
//! drop_dir = "self_uploads"
//! database = "mosaic.db"
//! output = "static/output/current_mosaic.jpg"
//! emblem = "static/base/emblem.png"
//!
//! [display]
//! output_url = "/static/output/current_mosaic.jpg"
//!
//! [defaults]
//! grid_size = [20, 20]
//! output_size = [1000, 1000]
//! title = "Candle Night Mosaic"
//! subtitle = "Our memories, together"
//!
//! [render]
//! quality = 95
//!
//! [notify]
//! history_size = 10
//! send_history = 5
//!
//! [logging]
//! level = "info"
//! ```
//!
//! The `[defaults]` section only seeds the first run; once settings have been
//! saved, the stored record wins. Unknown keys are rejected to catch typos
//! early.

use crate::imaging::Quality;
use crate::notify::{DEFAULT_HISTORY_SIZE, DEFAULT_SEND_HISTORY};
use crate::render::{DEFAULT_RENDER_QUALITY, RenderTarget};
use crate::settings::{
    DEFAULT_EMBLEM_PATH, DEFAULT_GRID_SIZE, DEFAULT_OUTPUT_SIZE, DEFAULT_SUBTITLE, DEFAULT_TITLE,
    MosaicSettings,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "mosaic.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Application configuration loaded from `mosaic.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// File areas, database and rendered output.
    pub paths: PathsConfig,
    /// Public-facing values.
    pub display: DisplayConfig,
    /// Settings used until an administrator saves their own.
    pub defaults: DefaultsConfig,
    pub render: RenderConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub upload_dir: String,
    pub processed_dir: String,
    /// Folder watched for files copied in by hand.
    pub drop_dir: String,
    pub database: String,
    /// Where the composite is written (overwritten on every render).
    pub output: String,
    pub emblem: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".into(),
            processed_dir: "uploads/processed".into(),
            drop_dir: "self_uploads".into(),
            database: "mosaic.db".into(),
            output: "static/output/current_mosaic.jpg".into(),
            emblem: DEFAULT_EMBLEM_PATH.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// URL announced to subscribers after each render.
    pub output_url: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            output_url: "/static/output/current_mosaic.jpg".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Cells as `[across, down]`.
    pub grid_size: [u32; 2],
    /// Composite size in pixels as `[width, height]`.
    pub output_size: [u32; 2],
    pub title: String,
    pub subtitle: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            grid_size: [DEFAULT_GRID_SIZE.0, DEFAULT_GRID_SIZE.1],
            output_size: [DEFAULT_OUTPUT_SIZE.0, DEFAULT_OUTPUT_SIZE.1],
            title: DEFAULT_TITLE.into(),
            subtitle: DEFAULT_SUBTITLE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// JPEG quality of the composite (1-100).
    pub quality: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_RENDER_QUALITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    /// Events kept per topic.
    pub history_size: usize,
    /// Events replayed to a new subscriber (at most `history_size`).
    pub send_history: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            history_size: DEFAULT_HISTORY_SIZE,
            send_history: DEFAULT_SEND_HISTORY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `candle_mosaic=debug`. `RUST_LOG`
    /// takes precedence.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let [gw, gh] = self.defaults.grid_size;
        if gw == 0 || gh == 0 {
            return Err(ConfigError::Validation(
                "defaults.grid_size values must be non-zero".into(),
            ));
        }
        let [ow, oh] = self.defaults.output_size;
        if ow == 0 || oh == 0 {
            return Err(ConfigError::Validation(
                "defaults.output_size values must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.render.quality) {
            return Err(ConfigError::Validation(
                "render.quality must be 1-100".into(),
            ));
        }
        if self.notify.send_history > self.notify.history_size {
            return Err(ConfigError::Validation(
                "notify.send_history must not exceed notify.history_size".into(),
            ));
        }
        if self.paths.output.is_empty() || self.paths.database.is_empty() {
            return Err(ConfigError::Validation(
                "paths.output and paths.database must be set".into(),
            ));
        }
        Ok(())
    }

    /// Settings the engine starts from before any stored record is loaded.
    pub fn default_settings(&self, base: &Path) -> MosaicSettings {
        let [gw, gh] = self.defaults.grid_size;
        let [ow, oh] = self.defaults.output_size;
        MosaicSettings {
            grid_size: (gw, gh),
            emblem_path: resolve(base, &self.paths.emblem),
            output_size: (ow, oh),
            title: self.defaults.title.clone(),
            subtitle: self.defaults.subtitle.clone(),
            regenerate_existing: false,
        }
    }

    pub fn render_target(&self, base: &Path) -> RenderTarget {
        RenderTarget {
            output_path: resolve(base, &self.paths.output),
            public_url: self.display.output_url.clone(),
            quality: Quality::new(self.render.quality),
        }
    }
}

/// Resolve a configured path against the config directory.
pub fn resolve(base: &Path, configured: &str) -> PathBuf {
    let path = Path::new(configured);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Load `mosaic.toml` from `dir`, or stock defaults if there is none.
pub fn load_config(dir: &Path) -> Result<AppConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `mosaic.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Candle Mosaic Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Relative paths are resolved against the directory holding this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Files
# ---------------------------------------------------------------------------
[paths]
# Raw uploads, stored as <id>_<original-name>.
upload_dir = "uploads"
# Cell-ready square crops, same names as the uploads.
processed_dir = "uploads/processed"
# Files copied here by hand are picked up on the next sync.
drop_dir = "self_uploads"
# SQLite database holding the photo catalog and the saved settings.
database = "mosaic.db"
# The rendered mosaic. Overwritten on every render.
output = "static/output/current_mosaic.jpg"
# Image the mosaic approximates.
emblem = "static/base/emblem.png"

# ---------------------------------------------------------------------------
# Display
# ---------------------------------------------------------------------------
[display]
# URL published to subscribers after each render.
output_url = "/static/output/current_mosaic.jpg"

# ---------------------------------------------------------------------------
# First-run settings (saved settings take precedence)
# ---------------------------------------------------------------------------
[defaults]
# Cells as [across, down].
grid_size = [20, 20]
# Mosaic size in pixels as [width, height].
output_size = [1000, 1000]
title = "Candle Night Mosaic"
subtitle = "Our memories, together"

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# JPEG quality of the mosaic (1-100).
quality = 95

# ---------------------------------------------------------------------------
# Notifications
# ---------------------------------------------------------------------------
[notify]
# Events remembered per topic.
history_size = 10
# Events replayed to a new subscriber.
send_history = 5

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# Filter directive; RUST_LOG overrides it.
level = "info"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.defaults.grid_size, [20, 20]);
        assert_eq!(config.defaults.output_size, [1000, 1000]);
        assert_eq!(config.render.quality, 95);
        assert_eq!(config.notify.history_size, 10);
        assert_eq!(config.notify.send_history, 5);
        assert_eq!(config.paths.emblem, "static/base/emblem.png");
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: AppConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
[defaults]
grid_size = [30, 40]
"##;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.defaults.grid_size, [30, 40]);
        // Default values preserved
        assert_eq!(config.defaults.output_size, [1000, 1000]);
        assert_eq!(config.paths.upload_dir, "uploads");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r##"
[defaults]
grid = [30, 40]
"##;
        assert!(toml::from_str::<AppConfig>(toml).is_err());
    }

    #[test]
    fn validate_zero_grid() {
        let mut config = AppConfig::default();
        config.defaults.grid_size = [0, 5];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grid_size"));
    }

    #[test]
    fn validate_quality_range() {
        let mut config = AppConfig::default();
        config.render.quality = 0;
        assert!(config.validate().is_err());
        config.render.quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_replay_within_history() {
        let mut config = AppConfig::default();
        config.notify.send_history = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_config(tmp.path()).unwrap(), AppConfig::default());
    }

    #[test]
    fn load_config_reads_and_validates_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "[display]\noutput_url = \"/m.jpg\"\n",
        )
        .unwrap();
        assert_eq!(load_config(tmp.path()).unwrap().display.output_url, "/m.jpg");

        fs::write(tmp.path().join(CONFIG_FILE), "[render]\nquality = 101\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config = AppConfig::default();
        let base = Path::new("/srv/event");
        let settings = config.default_settings(base);
        assert_eq!(
            settings.emblem_path,
            PathBuf::from("/srv/event/static/base/emblem.png")
        );
        assert_eq!(settings.grid_size, (20, 20));

        let target = config.render_target(base);
        assert_eq!(
            target.output_path,
            PathBuf::from("/srv/event/static/output/current_mosaic.jpg")
        );
        assert_eq!(target.quality.value(), 95);
        assert_eq!(resolve(base, "/abs/db.sqlite"), PathBuf::from("/abs/db.sqlite"));
    }
}
