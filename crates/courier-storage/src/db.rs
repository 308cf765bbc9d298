//! SQLite handle shared by the stores.
//!
//! One connection behind a `Mutex`; callers borrow it through
//! [`Database::with_conn`]. File databases run in WAL mode.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use courier_core::error::CourierError;

use crate::migrations;

pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create the database file at `path`, creating parent
    /// directories, then migrate it.
    pub fn new(path: &Path) -> Result<Self, CourierError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            CourierError::Storage(format!("Cannot open {}: {}", path.display(), e))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| CourierError::Storage(format!("Cannot configure {}: {}", path.display(), e)))?;

        let db = Self::migrated(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Database ready");
        Ok(db)
    }

    /// Private in-memory database, used by tests and ephemeral sessions.
    pub fn in_memory() -> Result<Self, CourierError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CourierError::Storage(format!("Cannot open in-memory database: {}", e)))?;
        Self::migrated(conn, None)
    }

    fn migrated(conn: Connection, path: Option<PathBuf>) -> Result<Self, CourierError> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Backing file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CourierError>
    where
        F: FnOnce(&Connection) -> Result<T, CourierError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CourierError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
