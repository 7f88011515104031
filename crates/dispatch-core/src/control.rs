//! Control files: on-disk progress markers for ticket files.
//!
//! Each ticket file `<path>` may carry sibling markers named
//! `<path>.ctrl.<stage>`:
//!
//! | Marker | Meaning |
//! |--------|---------|
//! | `.ctrl.doneS3` | object-store upload verified |
//! | `.ctrl.doneKafka` | broker signal acknowledged |
//! | `.ctrl.kafka` | next line to send in a bulk delivery (decimal) |
//!
//! A present `done*` marker means the stage must never run again for that
//! file. The cursor is only ever advanced after the broker acknowledged the
//! line it covers, so a crash can resend at most one line and never skip one.
//!
//! Markers are the only coordination between invocations. Every write is
//! flushed to disk before the call returns.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Substring that identifies control files in a ticket directory.
pub const CONTROL_INFIX: &str = ".ctrl";

/// Suffix of the bulk-delivery line cursor marker.
pub const CURSOR_SUFFIX: &str = "kafka";

/// A delivery stage recorded by a completion marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Object-store upload verified.
    DoneS3,
    /// Broker signal acknowledged.
    DoneKafka,
}

impl Stage {
    /// Marker suffix for this stage.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::DoneS3 => "doneS3",
            Self::DoneKafka => "doneKafka",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Returns true if `file_name` belongs to the control-file namespace.
#[must_use]
pub fn is_control_file(file_name: &str) -> bool {
    file_name.contains(CONTROL_INFIX)
}

fn with_suffix(ticket: &Path, suffix: &str) -> PathBuf {
    let mut name = ticket.as_os_str().to_os_string();
    name.push(CONTROL_INFIX);
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Path of the completion marker for `stage`.
#[must_use]
pub fn marker_path(ticket: &Path, stage: Stage) -> PathBuf {
    with_suffix(ticket, stage.suffix())
}

/// Path of the bulk-delivery cursor marker.
#[must_use]
pub fn cursor_path(ticket: &Path) -> PathBuf {
    with_suffix(ticket, CURSOR_SUFFIX)
}

/// Control markers of one ticket file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFiles {
    ticket: PathBuf,
}

impl ControlFiles {
    /// Binds the markers of `ticket`.
    #[must_use]
    pub fn new(ticket: impl Into<PathBuf>) -> Self {
        Self {
            ticket: ticket.into(),
        }
    }

    /// The ticket file these markers belong to.
    #[must_use]
    pub fn ticket(&self) -> &Path {
        &self.ticket
    }

    /// Returns true if the completion marker for `stage` exists.
    #[must_use]
    pub fn is_stage_done(&self, stage: Stage) -> bool {
        marker_path(&self.ticket, stage).exists()
    }

    /// Creates the empty completion marker for `stage`.
    ///
    /// Returns `Ok(false)` if the marker already existed; the stage was then
    /// recorded by an earlier run and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the marker cannot be created or synced.
    pub fn mark_stage_done(&self, stage: Stage) -> Result<bool> {
        let path = marker_path(&self.ticket, stage);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                file.sync_all().map_err(|e| Error::io(&path, e))?;
                sync_parent(&path);
                tracing::debug!(marker = %path.display(), "control file created");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::warn!(marker = %path.display(), "control file already present");
                Ok(false)
            }
            Err(err) => Err(Error::io(&path, err)),
        }
    }

    /// Removes the completion marker for `stage`. A missing marker is fine.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the marker exists but cannot be removed.
    pub fn clear_stage(&self, stage: Stage) -> Result<()> {
        remove_if_present(&marker_path(&self.ticket, stage))
    }

    /// Reads the bulk-delivery cursor: the number of lines already sent.
    ///
    /// A missing cursor is created with value `0`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error, or `Error::InvalidInput` if the marker content
    /// is not a decimal integer.
    pub fn read_line_cursor(&self) -> Result<u64> {
        let path = cursor_path(&self.ticket);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                trimmed.parse::<u64>().map_err(|_| {
                    Error::InvalidInput(format!(
                        "cursor {} holds {trimmed:?}, expected a line number",
                        path.display()
                    ))
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.advance_line_cursor(0)?;
                Ok(0)
            }
            Err(err) => Err(Error::io(&path, err)),
        }
    }

    /// Durably replaces the cursor with `line`.
    ///
    /// The value is written to a sibling temporary file, synced, and renamed
    /// over the cursor, so a crash leaves either the old or the new value.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any step fails.
    pub fn advance_line_cursor(&self, line: u64) -> Result<()> {
        let path = cursor_path(&self.ticket);
        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
        writeln!(file, "{line}").map_err(|e| Error::io(&tmp, e))?;
        file.sync_all().map_err(|e| Error::io(&tmp, e))?;
        drop(file);

        std::fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
        tracing::trace!(cursor = %path.display(), line, "cursor advanced");
        Ok(())
    }

    /// Removes the cursor marker. A missing cursor is fine.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cursor exists but cannot be removed.
    pub fn clear_cursor(&self) -> Result<()> {
        remove_if_present(&cursor_path(&self.ticket))
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(marker = %path.display(), "control file removed");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(path, err)),
    }
}

// Directory fsync is best effort; not every platform allows opening one.
fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent() {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_names_follow_convention() {
        let ticket = Path::new("/data/in/batch1.txt");
        assert_eq!(
            marker_path(ticket, Stage::DoneS3),
            PathBuf::from("/data/in/batch1.txt.ctrl.doneS3")
        );
        assert_eq!(
            marker_path(ticket, Stage::DoneKafka),
            PathBuf::from("/data/in/batch1.txt.ctrl.doneKafka")
        );
        assert_eq!(cursor_path(ticket), PathBuf::from("/data/in/batch1.txt.ctrl.kafka"));
        assert!(is_control_file("batch1.txt.ctrl.kafka.tmp"));
        assert!(!is_control_file("batch1.txt"));
    }

    #[test]
    fn mark_stage_done_is_once_only() {
        let dir = tempfile::tempdir().unwrap();
        let control = ControlFiles::new(dir.path().join("t.txt"));

        assert!(!control.is_stage_done(Stage::DoneS3));
        assert!(control.mark_stage_done(Stage::DoneS3).unwrap());
        assert!(control.is_stage_done(Stage::DoneS3));
        assert!(!control.mark_stage_done(Stage::DoneS3).unwrap());
        assert!(!control.is_stage_done(Stage::DoneKafka));

        control.clear_stage(Stage::DoneS3).unwrap();
        assert!(!control.is_stage_done(Stage::DoneS3));
        control.clear_stage(Stage::DoneS3).unwrap();
    }

    #[test]
    fn cursor_is_created_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ticket = dir.path().join("t.txt");
        let control = ControlFiles::new(&ticket);

        assert_eq!(control.read_line_cursor().unwrap(), 0);
        assert_eq!(std::fs::read_to_string(cursor_path(&ticket)).unwrap(), "0\n");
    }

    #[test]
    fn cursor_advances_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let ticket = dir.path().join("t.txt");
        let control = ControlFiles::new(&ticket);

        control.advance_line_cursor(41).unwrap();
        control.advance_line_cursor(42).unwrap();
        assert_eq!(control.read_line_cursor().unwrap(), 42);

        control.clear_cursor().unwrap();
        assert!(!cursor_path(&ticket).exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "no temporary files left behind");
    }

    #[test]
    fn corrupt_cursor_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ticket = dir.path().join("t.txt");
        std::fs::write(cursor_path(&ticket), "twelve\n").unwrap();

        let err = ControlFiles::new(&ticket).read_line_cursor().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
