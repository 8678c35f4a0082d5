//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while preparing process-wide plumbing
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid log output: {0}")]
    InvalidLogOutput(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("Invalid filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("Failed to prepare log directory: {0}")]
    LogDirectory(#[from] std::io::Error),

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}
