//! Per-file outcomes and run reports.

use std::fmt;
use std::path::PathBuf;

use dispatch_core::ticket::Disposition;

use crate::error::Error;

/// Exit status: every file delivered or skipped.
pub const EXIT_OK: u8 = 0;

/// Exit status: the run could not start.
pub const EXIT_FATAL: u8 = 1;

/// Exit status: the run completed but one or more files failed.
pub const EXIT_FILES_FAILED: u8 = 2;

/// What a delivered file achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivered {
    /// Tickets recorded for the file, when known.
    pub tickets: Option<u64>,
    /// Broker partition used, when the file went through the broker.
    pub partition: Option<i32>,
    /// Where the file went once finalized.
    pub disposition: Option<Disposition>,
}

/// Why a file was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The file disappeared before it could be processed.
    Vanished,
    /// The file was processed but not every stage is recorded yet.
    Incomplete,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vanished => f.write_str("vanished"),
            Self::Incomplete => f.write_str("incomplete"),
        }
    }
}

/// Why a file failed. The file keeps its markers and is retried next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Read-back digest mismatch after upload.
    Integrity {
        /// Object key.
        key: String,
        /// Local digest.
        local: String,
        /// Read-back digest.
        remote: String,
    },
    /// A broker or object-store call failed.
    Delivery(String),
    /// The ticket file could not be read.
    TransientFile(String),
    /// A stage marker could not be written.
    Marker(String),
    /// Archive, delete or marker cleanup failed.
    Finalize(String),
    /// The object to act on does not exist.
    NotFound(String),
    /// Any other error.
    Other(String),
}

impl FailureReason {
    /// Short label used in metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integrity { .. } => "integrity",
            Self::Delivery(_) => "delivery",
            Self::TransientFile(_) => "transient_file",
            Self::Marker(_) => "marker",
            Self::Finalize(_) => "finalize",
            Self::NotFound(_) => "not_found",
            Self::Other(_) => "other",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integrity { key, local, remote } => {
                write!(f, "checksum mismatch for {key}: local {local}, remote {remote}")
            }
            Self::Delivery(msg)
            | Self::TransientFile(msg)
            | Self::Marker(msg)
            | Self::Finalize(msg)
            | Self::NotFound(msg)
            | Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl From<&Error> for FailureReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::Integrity {
                key,
                expected,
                actual,
            } => Self::Integrity {
                key: key.clone(),
                local: expected.clone(),
                remote: actual.clone(),
            },
            Error::Delivery { .. } => Self::Delivery(err.to_string()),
            Error::TransientFile { .. } => Self::TransientFile(err.to_string()),
            Error::Marker { .. } => Self::Marker(err.to_string()),
            Error::Finalize { .. } => Self::Finalize(err.to_string()),
            Error::Core(core) if core.is_not_found() => Self::NotFound(err.to_string()),
            _ => Self::Other(err.to_string()),
        }
    }
}

/// Result of processing one ticket file (or one object for renames).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Every required stage completed.
    Delivered(Delivered),
    /// Nothing to do this run.
    Skipped(SkipReason),
    /// A stage failed.
    Failed(FailureReason),
}

impl FileOutcome {
    /// Metric label of the outcome.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered(_) => "delivered",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// One entry of a run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// Ticket file path, or object key.
    pub path: PathBuf,
    /// Outcome.
    pub outcome: FileOutcome,
}

/// Outcomes of every file handled by one action run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    files: Vec<FileReport>,
}

impl RunReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one file.
    pub fn push(&mut self, path: impl Into<PathBuf>, outcome: FileOutcome) {
        self.files.push(FileReport {
            path: path.into(),
            outcome,
        });
    }

    /// All entries, in processing order.
    #[must_use]
    pub fn files(&self) -> &[FileReport] {
        &self.files
    }

    /// Number of delivered files.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Delivered(_)))
    }

    /// Number of skipped files.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped(_)))
    }

    /// Number of failed files.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    /// Outcome recorded for `path`, if any.
    #[must_use]
    pub fn outcome_of(&self, path: &std::path::Path) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| &f.outcome)
    }

    /// Process exit status for this report.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.failed() > 0 {
            EXIT_FILES_FAILED
        } else {
            EXIT_OK
        }
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_reflects_failures() {
        let mut report = RunReport::new();
        report.push("a", FileOutcome::Delivered(Delivered::default()));
        report.push("b", FileOutcome::Skipped(SkipReason::Vanished));
        assert_eq!(report.exit_code(), EXIT_OK);

        report.push("c", FileOutcome::Failed(FailureReason::Delivery("down".into())));
        assert_eq!(report.exit_code(), EXIT_FILES_FAILED);
        assert_eq!(
            (report.delivered(), report.skipped(), report.failed()),
            (1, 1, 1)
        );
    }

    #[test]
    fn empty_report_is_success() {
        assert_eq!(RunReport::new().exit_code(), EXIT_OK);
    }

    #[test]
    fn integrity_error_keeps_digests() {
        let err = Error::Integrity {
            key: "k".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        let reason = FailureReason::from(&err);
        assert_eq!(reason.kind(), "integrity");
        assert_eq!(
            reason,
            FailureReason::Integrity {
                key: "k".into(),
                local: "aa".into(),
                remote: "bb".into()
            }
        );
    }
}
