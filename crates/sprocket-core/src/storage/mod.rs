//! Storage layer for Sprocket.
//!
//! Extension records and per-extension settings, persisted in SQLite or kept
//! in memory.

// SQL strings don't need hash-less raw strings
#![allow(clippy::needless_raw_string_hashes)]

pub mod database;
pub mod error;
pub mod metadata;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use metadata::{
    ExtensionMetadataStore, InMemoryMetadataStore, SettingsStore, SqliteMetadataStore,
};
