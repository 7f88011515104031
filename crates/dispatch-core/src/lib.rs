//! # dispatch-core
//!
//! Core primitives for the ticket dispatcher.
//!
//! This crate provides the building blocks the dispatch engine drives:
//!
//! - **Storage**: the [`StorageBackend`] seam with in-memory and S3 backends,
//!   and the verifying [`ObjectClient`]
//! - **Broker**: the [`Broker`] seam with an in-memory broker and, behind the
//!   `kafka` feature, a librdkafka-backed one
//! - **Control files**: crash-safe on-disk progress markers per ticket file
//! - **Partition selection**: least-lag routing with random fallback
//! - **Audit ledger**: idempotent per-file update statements
//! - **Observability**: logging initialization and spans
//!
//! ## Example
//!
//! ```rust
//! use dispatch_core::prelude::*;
//!
//! let ledger = AuditLedger::new("/tmp", "ims", "DISP");
//! let fields = AuditFields::builder().num_tickets(3).build();
//! let statement = ledger.statement("batch1.txt", &fields).unwrap();
//! assert!(statement.starts_with("update AUDIT_FILES set DISP_NUM=3"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod broker;
pub mod control;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod object_client;
pub mod observability;
pub mod partition;
pub mod storage;
pub mod ticket;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::audit::{AuditError, AuditFields, AuditLedger, FileNameRewriter};
    pub use crate::broker::{Broker, MemoryBroker, ProduceAck};
    pub use crate::control::{ControlFiles, Stage};
    pub use crate::error::{Error, Result};
    pub use crate::object_client::{ObjectClient, UploadOutcome, UploadReceipt};
    pub use crate::partition::{PartitionSelector, SelectionError};
    pub use crate::storage::{MemoryBackend, ObjectMeta, ObjectStoreBackend, StorageBackend};
}

pub use audit::{AuditError, AuditFields, AuditLedger, FileNameRewriter};
pub use broker::{Broker, MemoryBroker, ProduceAck};
pub use control::{ControlFiles, Stage};
pub use error::{Error, Result};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaBroker, KafkaSettings};
pub use object_client::{ObjectClient, UploadOutcome, UploadReceipt};
pub use observability::{LogFormat, LoggingConfig, init_logging};
pub use partition::{LagSnapshot, PartitionSelector, SelectionError};
pub use storage::{MemoryBackend, ObjectMeta, ObjectStoreBackend, S3Settings, StorageBackend};
