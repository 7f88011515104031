//! Pre-built test fixtures for common dispatch scenarios.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

/// A temporary landing area: a source directory for ticket files, an archive
/// directory and an audit root, all under one temp dir.
pub struct TicketDir {
    root: TempDir,
}

impl TicketDir {
    /// Creates the layout `<tmp>/in`, `<tmp>/audit`. The archive directory
    /// `<tmp>/archive` is left absent so pipelines have to create it.
    #[must_use]
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("in")).expect("create in");
        std::fs::create_dir(root.path().join("audit")).expect("create audit");
        Self { root }
    }

    /// Source directory holding the ticket files.
    #[must_use]
    pub fn source(&self) -> PathBuf {
        self.root.path().join("in")
    }

    /// Archive directory.
    #[must_use]
    pub fn archive(&self) -> PathBuf {
        self.root.path().join("archive")
    }

    /// Audit root.
    #[must_use]
    pub fn audit(&self) -> PathBuf {
        self.root.path().join("audit")
    }

    /// Writes a ticket file with the given lines, each newline-terminated.
    pub fn write_ticket(&self, name: &str, lines: &[&str]) -> PathBuf {
        let path = self.source().join(name);
        let mut content = lines.join("\n");
        if !lines.is_empty() {
            content.push('\n');
        }
        std::fs::write(&path, content).expect("write ticket");
        path
    }

    /// Writes ticket files in order, pausing between them so creation times
    /// differ.
    pub fn write_tickets_in_order(&self, files: &[(&str, &[&str])]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|(name, lines)| {
                let path = self.write_ticket(name, lines);
                std::thread::sleep(Duration::from_millis(15));
                path
            })
            .collect()
    }

    /// Names of every entry in the source directory, sorted.
    #[must_use]
    pub fn source_entries(&self) -> Vec<String> {
        list_names(&self.source())
    }

    /// Names of every entry in the archive directory, sorted.
    #[must_use]
    pub fn archive_entries(&self) -> Vec<String> {
        list_names(&self.archive())
    }

    /// Content of the audit log `<file>.<label>.audit`, if present.
    #[must_use]
    pub fn audit_log(&self, file: &str, label: &str) -> Option<String> {
        std::fs::read_to_string(self.audit().join(format!("{file}.{label}.audit"))).ok()
    }
}

impl Default for TicketDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted entry names of `dir`; empty if it does not exist.
#[must_use]
pub fn list_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_created() {
        let dir = TicketDir::new();
        assert!(dir.source().is_dir());
        assert!(dir.audit().is_dir());
        assert!(!dir.archive().exists());

        dir.write_ticket("b.txt", &["1", "2"]);
        assert_eq!(dir.source_entries(), vec!["b.txt"]);
        assert_eq!(
            std::fs::read_to_string(dir.source().join("b.txt")).unwrap(),
            "1\n2\n"
        );
        assert!(dir.archive_entries().is_empty());
    }
}
