//! Database connection and schema management.

use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use crate::storage::error::StorageResult;

/// Database connection wrapper.
///
/// Manages the SQLite connection and schema initialization.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the specified path, creating parent directories.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Errors
    /// * `StorageError::Io` - If the parent directory cannot be created
    /// * `StorageError::Connection` - If the database connection fails
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Opens an in-memory database for testing.
    ///
    /// # Errors
    /// * `StorageError::Connection` - If the database connection fails
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Gets a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Gets a mutable reference to the underlying connection.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    fn init_schema(&self) -> StorageResult<()> {
        info!("Initializing database schema");

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS extensions (
                name TEXT PRIMARY KEY,
                version TEXT NOT NULL,
                developer TEXT NOT NULL,
                description TEXT NOT NULL,
                commands TEXT NOT NULL,
                is_protected INTEGER NOT NULL DEFAULT 0,
                backing_file_path TEXT,
                loaded_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Settings are keyed by name and survive record deletion.
        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS extension_settings (
                name TEXT PRIMARY KEY,
                settings TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(())
    }
}
