//! Error types and result aliases for blobpack operations.
//!
//! Provides a unified error type that covers all possible error conditions
//! across the blobpack crates with actionable error messages.

use thiserror::Error;

/// Unified error type for all blobpack operations
#[derive(Error, Debug)]
pub enum BlobpackError {
    // Config errors
    #[error("Failed to parse blobpack.toml: {message}")]
    ConfigParse { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Bundle errors
    #[error("Resource '{key}' promised {expected} bytes but produced {actual}")]
    LengthMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Operation '{operation}' is not supported: {reason}")]
    Unsupported {
        operation: &'static str,
        reason: &'static str,
    },

    #[error("Resource not found in bundle index: {key}")]
    ResourceNotFound { key: String },

    #[error("Invalid bundle container: {reason}")]
    InvalidContainer { reason: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for blobpack operations
pub type BlobpackResult<T> = Result<T, BlobpackError>;

impl BlobpackError {
    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a JSON error from any serialization error type
    pub fn json<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Json {
            message,
            source: Box::new(source),
        }
    }

    /// Recover a blobpack error that was carried inside an `std::io::Error`.
    ///
    /// Streaming readers can only fail with `io::Error`, so length mismatches
    /// detected while draining travel as the inner error of an IO failure.
    pub fn from_stream_error(message: String, source: std::io::Error) -> Self {
        let carries_blobpack = source
            .get_ref()
            .map_or(false, |inner| inner.is::<BlobpackError>());
        if !carries_blobpack {
            return Self::Io { message, source };
        }

        let kind = source.kind();
        match source.into_inner().map(|inner| inner.downcast::<BlobpackError>()) {
            Some(Ok(err)) => *err,
            Some(Err(other)) => Self::Io {
                message,
                source: std::io::Error::new(kind, other),
            },
            None => Self::Io {
                message,
                source: std::io::Error::from(kind),
            },
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            BlobpackError::LengthMismatch { .. } => {
                Some("A file changed while the bundle was being written; re-run the pack")
            },
            BlobpackError::ResourceNotFound { .. } => {
                Some("Run 'blobpack list <bundle>' to see the available keys")
            },
            BlobpackError::InvalidContainer { .. } => {
                Some("Make sure the file was produced by 'blobpack pack'")
            },
            BlobpackError::ConfigParse { .. } | BlobpackError::ConfigValidation { .. } => {
                Some("Check the [bundle] section of blobpack.toml")
            },
            _ => None,
        }
    }
}
