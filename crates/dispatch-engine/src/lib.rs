//! # dispatch-engine
//!
//! Action dispatcher and delivery pipelines for ticket files.
//!
//! A run validates its [`Params`] into a [`Plan`] for one [`Action`], then
//! executes it against storage and broker backends:
//!
//! - **`s3Upload`**: upload and verify each pending file, optionally signal
//!   the broker, then archive or delete
//! - **`kafkaUpload`**: send each file line by line with a resumable cursor
//! - **`s3RenameObject`**: copy-then-delete one object
//!
//! Progress lives in control files next to each ticket file, so a crashed
//! run resumes where it stopped and never redoes a completed step.
//!
//! ## Example
//!
//! ```rust
//! use dispatch_engine::{Action, Error, Params};
//!
//! let err = Action::S3RenameObject.validate(&Params::default()).unwrap_err();
//! let Error::Configuration { missing } = err else { unreachable!() };
//! assert!(missing.contains(&"s3-object-name".to_string()));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod action;
pub mod config;
pub mod delivery;
pub mod error;
pub mod kafka_upload;
pub mod metrics;
pub mod outcome;
pub mod params;
pub mod rename;
pub mod s3_upload;

pub use action::{Action, Backends, Plan, VERSION};
pub use config::{
    AuditSettings, BrokerSettings, KafkaUploadConfig, RunLabels, S3RenameConfig, S3UploadConfig,
};
pub use delivery::{AuditInfo, BrokerDelivery, BulkReport};
pub use error::{Error, Result};
pub use kafka_upload::KafkaUploadPipeline;
pub use outcome::{
    Delivered, EXIT_FATAL, EXIT_FILES_FAILED, EXIT_OK, FailureReason, FileOutcome, FileReport,
    RunReport, SkipReason,
};
pub use params::Params;
pub use rename::rename_object;
pub use s3_upload::S3UploadPipeline;
