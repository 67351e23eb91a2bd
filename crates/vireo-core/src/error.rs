//! Error types for the engine core.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The logging service could not be installed.
    #[error("Logging initialisation failed: {0}")]
    Logging(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
