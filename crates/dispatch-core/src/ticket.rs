//! Ticket directory helpers: listing, counting and final disposition.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::control::is_control_file;
use crate::error::{Error, Result};

/// How an archived ticket file is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveName {
    /// `<archive>/<basename>`.
    Plain,
    /// `<archive>/<basename>.<unix-seconds>`.
    Timestamped,
}

/// What happened to a finished ticket file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Moved to the given path.
    Archived(PathBuf),
    /// Removed.
    Deleted,
}

/// Directory scanned for a batch: the parent of `file_path`.
#[must_use]
pub fn batch_dir(file_path: &Path) -> PathBuf {
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Base name of a ticket file as UTF-8.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the path has no UTF-8 file name.
pub fn base_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("no file name in {}", path.display())))
}

/// Lists the pending ticket files of `dir`, oldest first.
///
/// Only regular files are returned; control files are excluded. Files are
/// ordered by creation time (modification time where the platform does not
/// record creation), then by name.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn pending_ticket_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let name = entry.file_name();
        if is_control_file(&name.to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        // Files vanishing between listing and stat belong to someone else.
        let Ok(meta) = std::fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((created, path));
    }

    files.sort();
    tracing::debug!(dir = %dir.display(), count = files.len(), "pending ticket files listed");
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Counts the non-blank lines of a ticket file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read as UTF-8 text.
pub fn count_tickets(path: &Path) -> Result<u64> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(content.lines().filter(|line| !line.trim().is_empty()).count() as u64)
}

/// Archives `path` into `archive_dir`, or deletes it when no archive is set.
///
/// The archive directory is created if needed. Moves across filesystems fall
/// back to copy and remove.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or the file
/// cannot be moved or removed. The source file is left in place on error.
pub fn archive_or_delete(
    path: &Path,
    archive_dir: Option<&Path>,
    naming: ArchiveName,
) -> Result<Disposition> {
    let Some(archive_dir) = archive_dir else {
        std::fs::remove_file(path).map_err(|e| Error::io(path, e))?;
        tracing::debug!(file = %path.display(), "ticket file deleted");
        return Ok(Disposition::Deleted);
    };

    std::fs::create_dir_all(archive_dir).map_err(|e| Error::io(archive_dir, e))?;

    let name = base_name(path)?;
    let target = match naming {
        ArchiveName::Plain => archive_dir.join(name),
        ArchiveName::Timestamped => {
            let secs = chrono::Utc::now().timestamp();
            archive_dir.join(format!("{name}.{secs}"))
        }
    };

    if let Err(err) = std::fs::rename(path, &target) {
        tracing::debug!(file = %path.display(), error = %err, "rename failed, copying instead");
        std::fs::copy(path, &target).map_err(|e| Error::io(&target, e))?;
        if let Err(err) = std::fs::remove_file(path) {
            let _ = std::fs::remove_file(&target);
            return Err(Error::io(path, err));
        }
    }

    tracing::debug!(file = %path.display(), archive = %target.display(), "ticket file archived");
    Ok(Disposition::Archived(target))
}
