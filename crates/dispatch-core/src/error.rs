//! Error types and result aliases for the dispatcher primitives.
//!
//! Errors raised by the collaborator seams (object store, broker, local
//! filesystem). The engine classifies them into per-file outcomes.

use std::path::{Path, PathBuf};

/// The result type used throughout `dispatch-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core dispatcher operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An object-store operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A broker operation failed.
    #[error("broker error: {message}")]
    Broker {
        /// Description of the broker failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A local file operation failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// A path or object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new broker error with the given message.
    #[must_use]
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new broker error with a source cause.
    #[must_use]
    pub fn broker_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Broker {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps an I/O error with the path it occurred on.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns true if this error means the target does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = Error::storage_with_source("upload failed", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn io_error_names_path() {
        let err = Error::io(
            "/data/in/batch1.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/data/in/batch1.txt"));
        assert!(err.is_not_found());
    }

    #[test]
    fn broker_error_is_not_not_found() {
        assert!(!Error::broker("timed out").is_not_found());
        assert!(Error::NotFound("k".into()).is_not_found());
    }
}
