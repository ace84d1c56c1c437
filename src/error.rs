//! Error types for lsmcore.

use std::io;
use thiserror::Error;

/// Result type alias for lsmcore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by the cache and table layers.
///
/// The cache itself is infallible; errors originate from file access and
/// table parsing, and from iterators via `status()`.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Data corruption detected while parsing a table or block.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Resource not found. Returned when neither table filename variant
    /// could be opened.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid argument supplied by a caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Create a corruption error with the given message.
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create a not-found error with the given message.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an invalid-argument error with the given message.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Check if this error indicates corruption.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }

    /// Check if this error indicates a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
