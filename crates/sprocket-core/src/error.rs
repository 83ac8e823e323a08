//! Error types for Sprocket Core.

use crate::config::ConfigError;
use crate::extensions::{ExtensionError, UnitError};
use crate::storage::StorageError;
use crate::transport::TransportError;
use thiserror::Error;

/// Core error type for Sprocket operations.
#[derive(Error, Debug)]
pub enum SprocketError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Extension lifecycle errors
    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),

    /// Unit runtime errors
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    /// Chat transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias for Sprocket operations.
pub type Result<T> = std::result::Result<T, SprocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprocket_error_storage_conversion() {
        let storage_err = StorageError::InvalidData("settings must be an object".to_string());
        let err: SprocketError = storage_err.into();
        match err {
            SprocketError::Storage(StorageError::InvalidData(msg)) => {
                assert_eq!(msg, "settings must be an object");
            }
            _ => panic!("Expected Storage error variant"),
        }
    }

    #[test]
    fn test_sprocket_error_extension_conversion() {
        let err: SprocketError = ExtensionError::NotFound("xyz".to_string()).into();
        assert_eq!(err.to_string(), "Extension error: extension not found: xyz");
    }

    #[test]
    fn test_sprocket_error_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: SprocketError = io_err.into();
        assert!(matches!(err, SprocketError::Io(_)));
    }

    #[test]
    fn test_sprocket_error_config() {
        let err: SprocketError = ConfigError::InvalidValue("prefix".to_string()).into();
        assert_eq!(err.to_string(), "Configuration error: Invalid configuration value: prefix");
    }
}
