//! Shared test utilities for dispatcher tests.
//!
//! This crate provides:
//! - [`TracingMemoryBackend`]: In-memory storage with operation recording,
//!   failure injection and corrupted read-backs
//! - [`TicketDir`]: Temporary source/archive/audit layout
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use dispatch_test_utils::{TicketDir, TracingMemoryBackend, assert_put_count};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let dir = TicketDir::new();
//!     dir.write_ticket("batch1.txt", &["a", "b"]);
//!     let storage = TracingMemoryBackend::new();
//!     // ... run a pipeline ...
//!     assert_put_count(&storage, 1);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;
pub mod storage;

pub use assertions::*;
pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("dispatch=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
