//! Error types for the dispatch engine.
//!
//! Start-up failures (`Configuration`, `InvalidParameter`) abort a run before
//! any file is touched. Every other variant describes why one ticket file
//! failed; the pipelines turn those into [`crate::outcome::FileOutcome`]
//! values and keep going.

use std::path::PathBuf;

use dispatch_core::audit::AuditError;
use dispatch_core::partition::SelectionError;

/// The result type used throughout `dispatch-engine`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the dispatch engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// One or more required parameters are missing.
    #[error("missing required parameter(s): {}", missing.join(", "))]
    Configuration {
        /// Every missing parameter name.
        missing: Vec<String>,
    },

    /// A parameter is present but unusable.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A ticket file could not be read.
    #[error("ticket file {} unavailable: {reason}", path.display())]
    TransientFile {
        /// Ticket file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The object read back after upload differs from the local file.
    #[error("checksum mismatch for {key}: local {expected}, remote {actual}")]
    Integrity {
        /// Object key.
        key: String,
        /// Local digest.
        expected: String,
        /// Read-back digest.
        actual: String,
    },

    /// A broker or object-store call failed.
    #[error("delivery failed: {message}")]
    Delivery {
        /// What was being delivered.
        message: String,
        /// The underlying cause.
        #[source]
        source: dispatch_core::Error,
    },

    /// An audit statement could not be stored.
    #[error(transparent)]
    AuditWrite(#[from] AuditError),

    /// A stage marker could not be recorded.
    #[error("cannot record stage marker for {}: {source}", path.display())]
    Marker {
        /// Ticket file path.
        path: PathBuf,
        /// The underlying cause.
        #[source]
        source: dispatch_core::Error,
    },

    /// Archiving or deleting a delivered file, or removing its markers, failed.
    #[error("cannot finalize {}: {source}", path.display())]
    Finalize {
        /// Ticket file path.
        path: PathBuf,
        /// The underlying cause.
        #[source]
        source: dispatch_core::Error,
    },

    /// A core operation failed outside of a classified stage.
    #[error(transparent)]
    Core(#[from] dispatch_core::Error),
}

impl Error {
    /// Creates a delivery error.
    #[must_use]
    pub fn delivery(message: impl Into<String>, source: dispatch_core::Error) -> Self {
        Self::Delivery {
            message: message.into(),
            source,
        }
    }

    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any file was processed.
    #[must_use]
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::InvalidParameter { .. }
        )
    }
}

// Without a partition source the run is misconfigured; partition 0 is never
// assumed.
impl From<SelectionError> for Error {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::NoPartitionSource { topic } => Self::Configuration {
                missing: vec![format!(
                    "kafka-partition or kafka-num-partitions (topic {topic})"
                )],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_lists_every_name() {
        let err = Error::Configuration {
            missing: vec!["s3-bucket".into(), "file-path".into()],
        };
        assert_eq!(
            err.to_string(),
            "missing required parameter(s): s3-bucket, file-path"
        );
        assert!(err.is_startup());
    }

    #[test]
    fn selection_failure_is_configuration() {
        let err = Error::from(SelectionError::NoPartitionSource {
            topic: "tickets".into(),
        });
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn delivery_is_not_startup() {
        let err = Error::delivery("produce", dispatch_core::Error::broker("down"));
        assert!(!err.is_startup());
        assert!(err.to_string().contains("delivery failed"));
    }
}
