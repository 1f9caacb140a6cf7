//! Common error types for MovieSync.

use thiserror::Error;

/// Top-level error type for MovieSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A movie record failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation not permitted in the current state.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote service could not be reached at all.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote service answered with a non-success status.
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },
}

impl Error {
    /// Whether this failure means the service is unavailable rather than
    /// that the request itself was rejected.
    ///
    /// Connectivity-level failures are recovered locally; everything else
    /// propagates to the caller.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
