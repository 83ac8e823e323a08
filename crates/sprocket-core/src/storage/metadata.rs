//! Extension metadata and settings persistence.

use crate::extensions::{CommandInfo, ExtensionRecord};
use crate::storage::database::Database;
use crate::storage::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::debug;

/// Persistent store of extension records.
#[async_trait]
pub trait ExtensionMetadataStore: Send + Sync {
    /// Fetches the record for `name`.
    async fn get(&self, name: &str) -> StorageResult<Option<ExtensionRecord>>;

    /// Replaces the record for `record.name` (delete then insert, no merge).
    async fn upsert(&self, record: &ExtensionRecord) -> StorageResult<()>;

    /// Deletes the record for `name`. Returns whether one existed.
    async fn delete(&self, name: &str) -> StorageResult<bool>;

    /// All records, sorted by name.
    async fn list_all(&self) -> StorageResult<Vec<ExtensionRecord>>;
}

/// Per-extension settings persistence.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Loads the settings object of `name` (empty object when unset).
    async fn load_settings(&self, name: &str) -> StorageResult<Value>;

    /// Saves the settings object of `name`.
    async fn save_settings(&self, name: &str, settings: &Value) -> StorageResult<()>;
}

// ============================================================================
// SQLite Store
// ============================================================================

/// SQLite-backed metadata and settings store.
pub struct SqliteMetadataStore {
    db: Mutex<Database>,
}

impl std::fmt::Debug for SqliteMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetadataStore").finish_non_exhaustive()
    }
}

impl SqliteMetadataStore {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Wraps an open database.
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> StorageResult<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

const RECORD_COLUMNS: &str =
    "name, version, developer, description, commands, is_protected, backing_file_path, loaded_at";

fn record_from_row(row: &Row) -> rusqlite::Result<ExtensionRecord> {
    let commands_json: String = row.get(4)?;
    let commands: Vec<CommandInfo> = serde_json::from_str(&commands_json).map_err(|_| {
        rusqlite::Error::InvalidColumnType(4, "commands".to_string(), rusqlite::types::Type::Text)
    })?;
    let loaded_at: String = row.get(7)?;
    let loaded_at = DateTime::parse_from_rfc3339(&loaded_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                7,
                "loaded_at".to_string(),
                rusqlite::types::Type::Text,
            )
        })?;
    let backing_file_path: Option<String> = row.get(6)?;

    Ok(ExtensionRecord {
        name: row.get(0)?,
        version: row.get(1)?,
        developer: row.get(2)?,
        description: row.get(3)?,
        commands,
        is_protected: row.get(5)?,
        backing_file_path: backing_file_path.map(PathBuf::from),
        loaded_at,
    })
}

#[async_trait]
impl ExtensionMetadataStore for SqliteMetadataStore {
    async fn get(&self, name: &str) -> StorageResult<Option<ExtensionRecord>> {
        let db = self.db()?;
        let record = db
            .conn()
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM extensions WHERE name = ?1"),
                params![name],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    async fn upsert(&self, record: &ExtensionRecord) -> StorageResult<()> {
        let commands_json = serde_json::to_string(&record.commands)?;
        let backing = record.backing_file_path.as_ref().map(|p| p.to_string_lossy().to_string());

        let mut db = self.db()?;
        let tx = db.conn_mut().transaction()?;
        tx.execute("DELETE FROM extensions WHERE name = ?1", params![record.name])?;
        tx.execute(
            &format!(
                "INSERT INTO extensions ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                record.name,
                record.version,
                record.developer,
                record.description,
                commands_json,
                record.is_protected,
                backing,
                record.loaded_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;
        debug!(extension = %record.name, "Stored extension record");
        Ok(())
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        let db = self.db()?;
        let rows = db.conn().execute("DELETE FROM extensions WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    async fn list_all(&self) -> StorageResult<Vec<ExtensionRecord>> {
        let db = self.db()?;
        let mut stmt =
            db.conn().prepare(&format!("SELECT {RECORD_COLUMNS} FROM extensions ORDER BY name"))?;
        let records = stmt.query_map([], record_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[async_trait]
impl SettingsStore for SqliteMetadataStore {
    async fn load_settings(&self, name: &str) -> StorageResult<Value> {
        let db = self.db()?;
        let raw: Option<String> = db
            .conn()
            .query_row(
                "SELECT settings FROM extension_settings WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Value::Object(serde_json::Map::new())),
        }
    }

    async fn save_settings(&self, name: &str, settings: &Value) -> StorageResult<()> {
        if !settings.is_object() {
            return Err(StorageError::InvalidData(format!(
                "settings of {name} must be a JSON object"
            )));
        }
        let raw = serde_json::to_string(settings)?;
        let db = self.db()?;
        db.conn().execute(
            "INSERT INTO extension_settings (name, settings) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET settings = excluded.settings",
            params![name, raw],
        )?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<String, ExtensionRecord>>,
    settings: RwLock<HashMap<String, Value>>,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExtensionMetadataStore for InMemoryMetadataStore {
    async fn get(&self, name: &str) -> StorageResult<Option<ExtensionRecord>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn upsert(&self, record: &ExtensionRecord) -> StorageResult<()> {
        self.records.write().await.insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> StorageResult<bool> {
        Ok(self.records.write().await.remove(name).is_some())
    }

    async fn list_all(&self) -> StorageResult<Vec<ExtensionRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}

#[async_trait]
impl SettingsStore for InMemoryMetadataStore {
    async fn load_settings(&self, name: &str) -> StorageResult<Value> {
        Ok(self
            .settings
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }

    async fn save_settings(&self, name: &str, settings: &Value) -> StorageResult<()> {
        if !settings.is_object() {
            return Err(StorageError::InvalidData(format!(
                "settings of {name} must be a JSON object"
            )));
        }
        self.settings.write().await.insert(name.to_string(), settings.clone());
        Ok(())
    }
}
