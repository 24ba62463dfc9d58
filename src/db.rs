//! SQLite persistence for the photo catalog and the settings record.
//!
//! ```text
//! images    id TEXT PK | filename TEXT | timestamp TEXT (RFC 3339) | used INTEGER
//! settings  id INTEGER PK (always 1) | grid_size TEXT "[w,h]" | emblem_path TEXT
//!           | title TEXT | subtitle TEXT | output_size TEXT "[w,h]" | updated_at TEXT
//! ```
//!
//! One connection behind a mutex; every call is a short statement, so the
//! catalog can be shared across threads without a pool.

use crate::catalog::{ImageCatalog, Photo};
use crate::error::{MosaicError, Result};
use crate::settings::{
    DEFAULT_OUTPUT_SIZE, MosaicSettings, SettingsStore, decode_pair, encode_pair,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Row id of the single settings record.
const SETTINGS_ID: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id        TEXT PRIMARY KEY,
    filename  TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    used      INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS settings (
    id          INTEGER PRIMARY KEY,
    grid_size   TEXT NOT NULL,
    emblem_path TEXT NOT NULL,
    title       TEXT NOT NULL,
    subtitle    TEXT NOT NULL,
    output_size TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
"#;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MosaicError::io("create database directory", parent, e))?;
        }
        let conn = Connection::open(path).map_err(MosaicError::catalog("open"))?;
        let db = Self::with_connection(conn)?;
        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(MosaicError::catalog("open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(MosaicError::catalog("create schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settings write without `ON CONFLICT`: look the row up, then update or
    /// insert. Same end state as the upsert.
    pub(crate) fn save_settings_by_lookup(&self, settings: &MosaicSettings) -> Result<()> {
        let conn = self.conn();
        let exists = conn
            .query_row(
                "SELECT 1 FROM settings WHERE id = ?1",
                [SETTINGS_ID],
                |_| Ok(()),
            )
            .optional()
            .map_err(MosaicError::catalog("look up settings"))?
            .is_some();
        let values = SettingsColumns::from(settings);
        if exists {
            values
                .execute(
                    &conn,
                    "UPDATE settings SET grid_size = ?2, emblem_path = ?3, title = ?4, \
                     subtitle = ?5, output_size = ?6, updated_at = ?7 WHERE id = ?1",
                )
                .map_err(MosaicError::catalog("update settings"))?;
        } else {
            values
                .execute(
                    &conn,
                    "INSERT INTO settings (id, grid_size, emblem_path, title, subtitle, \
                     output_size, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(MosaicError::catalog("insert settings"))?;
        }
        Ok(())
    }

    fn upsert_settings(&self, settings: &MosaicSettings) -> Result<()> {
        let values = SettingsColumns::from(settings);
        values
            .execute(
                &self.conn(),
                "INSERT INTO settings (id, grid_size, emblem_path, title, subtitle, \
                 output_size, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(id) DO UPDATE SET grid_size = excluded.grid_size, \
                 emblem_path = excluded.emblem_path, title = excluded.title, \
                 subtitle = excluded.subtitle, output_size = excluded.output_size, \
                 updated_at = excluded.updated_at",
            )
            .map_err(MosaicError::catalog("upsert settings"))?;
        Ok(())
    }

    #[cfg(test)]
    fn raw_settings(&self, grid_size: &str, output_size: &str) {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO settings VALUES (1, ?1, 'e.png', 't', 's', ?2, 'now')",
                params![grid_size, output_size],
            )
            .unwrap();
    }
}

/// Settings as stored column values.
struct SettingsColumns {
    grid_size: String,
    emblem_path: String,
    title: String,
    subtitle: String,
    output_size: String,
    updated_at: String,
}

impl From<&MosaicSettings> for SettingsColumns {
    fn from(s: &MosaicSettings) -> Self {
        Self {
            grid_size: encode_pair(s.grid_size),
            emblem_path: s.emblem_path.to_string_lossy().into_owned(),
            title: s.title.clone(),
            subtitle: s.subtitle.clone(),
            output_size: encode_pair(s.output_size),
            updated_at: stored_timestamp(&Utc::now()),
        }
    }
}

impl SettingsColumns {
    /// Run `sql` with the columns bound as `?1..?7`, id first.
    fn execute(&self, conn: &Connection, sql: &str) -> rusqlite::Result<usize> {
        conn.execute(
            sql,
            params![
                SETTINGS_ID,
                self.grid_size,
                self.emblem_path,
                self.title,
                self.subtitle,
                self.output_size,
                self.updated_at,
            ],
        )
    }
}

/// Fixed-width RFC 3339 so text order is time order.
fn stored_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    let raw: String = row.get(2)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(Photo {
        id: row.get(0)?,
        filename: row.get(1)?,
        timestamp,
        used: row.get(3)?,
    })
}

impl ImageCatalog for Database {
    fn insert(&self, photo: &Photo) -> Result<bool> {
        let changed = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO images (id, filename, timestamp, used) VALUES (?1, ?2, ?3, ?4)",
                params![
                    photo.id,
                    photo.filename,
                    stored_timestamp(&photo.timestamp),
                    photo.used
                ],
            )
            .map_err(MosaicError::catalog("insert image"))?;
        if changed == 0 {
            debug!(id = %photo.id, "image already cataloged");
        }
        Ok(changed > 0)
    }

    fn get(&self, id: &str) -> Result<Option<Photo>> {
        self.conn()
            .query_row(
                "SELECT id, filename, timestamp, used FROM images WHERE id = ?1",
                [id],
                photo_from_row,
            )
            .optional()
            .map_err(MosaicError::catalog("get image"))
    }

    fn filename(&self, id: &str) -> Result<Option<String>> {
        self.conn()
            .query_row("SELECT filename FROM images WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(MosaicError::catalog("get image filename"))
    }

    fn all(&self) -> Result<Vec<Photo>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, filename, timestamp, used FROM images ORDER BY timestamp, rowid")
            .map_err(MosaicError::catalog("list images"))?;
        let photos = stmt
            .query_map([], photo_from_row)
            .map_err(MosaicError::catalog("list images"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(MosaicError::catalog("list images"))?;
        Ok(photos)
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
            .map_err(MosaicError::catalog("count images"))?;
        Ok(n.max(0) as usize)
    }

    fn mark_used(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn()
            .execute("UPDATE images SET used = 1 WHERE id = ?1", [id])
            .map_err(MosaicError::catalog("mark image used"))?;
        Ok(changed > 0)
    }

    fn delete_all(&self) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM images", [])
            .map_err(MosaicError::catalog("delete images"))?;
        info!(removed, "catalog cleared");
        Ok(removed)
    }
}

impl SettingsStore for Database {
    fn load(&self) -> Result<Option<MosaicSettings>> {
        let row = self
            .conn()
            .query_row(
                "SELECT grid_size, emblem_path, title, subtitle, output_size FROM settings WHERE id = ?1",
                [SETTINGS_ID],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(MosaicError::catalog("load settings"))?;

        let Some((grid_size, emblem_path, title, subtitle, output_size)) = row else {
            return Ok(None);
        };
        let grid_size = decode_pair("grid_size", &grid_size)?;
        let output_size = decode_pair("output_size", &output_size).unwrap_or_else(|e| {
            warn!(error = %e, "stored output size unreadable, using default");
            DEFAULT_OUTPUT_SIZE
        });
        Ok(Some(MosaicSettings {
            grid_size,
            emblem_path: PathBuf::from(emblem_path),
            output_size,
            title,
            subtitle,
            regenerate_existing: false,
        }))
    }

    fn save(&self, settings: &MosaicSettings) -> Result<()> {
        if let Err(e) = self.upsert_settings(settings) {
            warn!(error = %e, "settings upsert failed, retrying with lookup");
            self.save_settings_by_lookup(settings)?;
        }
        debug!("settings saved");
        Ok(())
    }
}
