//! Error types for the Gatehouse service.

use thiserror::Error;

/// Main error type for Gatehouse operations.
#[derive(Error, Debug)]
pub enum GatehouseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GatehouseError {
    fn from(err: config::ConfigError) -> Self {
        GatehouseError::Config(err.to_string())
    }
}

/// Result type alias for Gatehouse operations.
pub type Result<T> = std::result::Result<T, GatehouseError>;
