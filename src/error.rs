//! Error types for the Akhbarna rate limiting service.
//!
//! The limiter itself never fails; these cover the layers around it.

use thiserror::Error;

/// Main error type for service operations.
#[derive(Error, Debug)]
pub enum AkhbarnaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limit policy file errors
    #[error("Policy error: {0}")]
    Policy(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AkhbarnaError {
    fn from(err: config::ConfigError) -> Self {
        AkhbarnaError::Config(err.to_string())
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, AkhbarnaError>;
