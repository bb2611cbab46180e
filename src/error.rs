//! Error types for the page cache HTTP server

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving files
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// Resource missing, unreadable, or read short
    #[error("Resource not found: {key}")]
    NotFound { key: String },

    /// Could not reserve a buffer for the file contents
    #[error("Allocation of {size} bytes failed: {reason}")]
    AllocationFailed { size: u64, reason: String },

    /// Requested target does not normalize to a usable resource key
    #[error("Invalid resource key: {0:?}")]
    InvalidKey(String),

    /// Page cache has been shut down
    #[error("Page cache is closed")]
    CacheClosed,

    // =========================================================================
    // Server Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Access log writer failed
    #[error("Access log error: {0}")]
    AccessLog(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not-found error for a key
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    /// Whether this error is answered with a 404 rather than treated as a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::AllocationFailed { .. }
                | Error::InvalidKey(_)
                | Error::CacheClosed
        )
    }
}
