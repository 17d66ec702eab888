//! The attendance database handle.
//!
//! One SQLite file holds users, attendance logs and broker settings. The
//! controller task is its only writer, so the handle is `Send` but not
//! `Sync` and no pooling is involved. File databases run in WAL mode so an
//! external `sqlite3` shell can read while the controller writes. Foreign
//! keys are switched on for every connection, which is what makes deleting a
//! user take their attendance rows with it.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Migrated connection; every typed query lives in an `impl Database` block
/// next to its table (`users.rs`, `attendance.rs`, `settings.rs`).
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open `attendance.db` in the per-user data directory, creating it on
    /// first run:
    /// - Linux:   `~/.local/share/verifynger/attendance.db`
    /// - macOS:   `~/Library/Application Support/id.verifynger.verifynger/attendance.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\verifynger\verifynger\data\attendance.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("id", "verifynger", "verifynger").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("attendance.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// `VERIFYNGER_DB_PATH` lands here. Missing parent directories are
    /// created.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Fresh, migrated, throwaway database. WAL does not apply in memory;
    /// the cascade does.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Log rows cascade away with their user.
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File backing this handle; `None` in memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parents_and_enables_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());
        assert!(path.exists());

        let mode: String = db
            .conn()
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }

    #[test]
    fn in_memory_has_no_path_but_enforces_foreign_keys() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());

        let fk: i64 = db
            .conn()
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        drop(Database::open_at(&path).unwrap());
        let db = Database::open_at(&path).unwrap();
        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, crate::migrations::CURRENT_VERSION);
    }
}
