//! Storage errors.

use thiserror::Error;

/// Failures raised by the metadata and settings stores.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite rejected a statement or the connection failed.
    #[error("database error: {0}")]
    Connection(#[from] rusqlite::Error),

    /// A JSON column (commands, settings) could not be encoded or decoded.
    #[error("malformed JSON column: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored or submitted value has the wrong shape.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The database handle was poisoned by a panicking writer.
    #[error("database handle poisoned")]
    LockPoisoned,

    /// The database directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
