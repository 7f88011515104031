//! Custom assertion helpers for integration tests.

use std::path::Path;

use dispatch_core::control::is_control_file;

use crate::fixtures::list_names;
use crate::storage::{StorageOp, TracingMemoryBackend};

/// Asserts that `dir` holds no control files.
///
/// # Panics
///
/// Panics if any `.ctrl` file is present.
pub fn assert_no_control_files(dir: &Path) {
    let leftovers: Vec<String> = list_names(dir)
        .into_iter()
        .filter(|name| is_control_file(name))
        .collect();
    assert!(
        leftovers.is_empty(),
        "Expected no control files in {}, found {leftovers:?}",
        dir.display()
    );
}

/// Asserts the number of puts recorded by the backend.
///
/// # Panics
///
/// Panics if the count differs.
pub fn assert_put_count(storage: &TracingMemoryBackend, expected: usize) {
    let puts: Vec<StorageOp> = storage
        .operations()
        .into_iter()
        .filter(|op| matches!(op, StorageOp::Put { .. }))
        .collect();
    assert_eq!(
        puts.len(),
        expected,
        "Expected {expected} put(s), recorded {puts:?}"
    );
}

/// Asserts that every line of an audit log carries the `is NULL` guard when
/// it sets `<label>_DATE`.
///
/// # Panics
///
/// Panics on a timestamped statement without the guard.
pub fn assert_guarded_statements(log: &str, label: &str) {
    let date_column = format!("{label}_DATE=");
    let guard = format!("and {label}_DATE is NULL;");
    for line in log.lines().filter(|l| l.contains(&date_column)) {
        assert!(
            line.ends_with(&guard),
            "Statement sets {label}_DATE without guard: {line}"
        );
    }
}
