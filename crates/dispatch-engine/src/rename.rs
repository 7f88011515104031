//! Object rename action.

use dispatch_core::object_client::ObjectClient;

use crate::config::S3RenameConfig;
use crate::error::Error;
use crate::outcome::{Delivered, FailureReason, FileOutcome, RunReport};

/// Renames one object by copy-then-delete.
///
/// The report holds a single entry keyed by the old object name. A missing
/// source is a failure, not an error.
pub async fn rename_object(objects: &ObjectClient, config: &S3RenameConfig) -> RunReport {
    let outcome = match objects.rename(&config.old_key, &config.new_key).await {
        Ok(true) => {
            tracing::info!(from = %config.old_key, to = %config.new_key, bucket = %config.s3.bucket, "object renamed");
            FileOutcome::Delivered(Delivered::default())
        }
        Ok(false) => {
            tracing::error!(key = %config.old_key, bucket = %config.s3.bucket, "object to rename does not exist");
            FileOutcome::Failed(FailureReason::NotFound(format!(
                "object {} not found",
                config.old_key
            )))
        }
        Err(err) => {
            let err = Error::delivery(
                format!("rename of {} to {}", config.old_key, config.new_key),
                err,
            );
            tracing::error!(error = %err, "rename failed");
            FileOutcome::Failed(FailureReason::from(&err))
        }
    };

    let mut report = RunReport::new();
    report.push(&config.old_key, outcome);
    report
}
