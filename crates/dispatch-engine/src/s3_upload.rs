//! Object-store delivery pipeline.
//!
//! For each pending ticket file, oldest first:
//!
//! 1. upload and verify unless `.ctrl.doneS3` exists, then mark `doneS3` and
//!    audit the completion;
//! 2. with signaling enabled and no `.ctrl.doneKafka`, send
//!    `{"FilePath":"<name>"}`, audit the partition, then mark `doneKafka`;
//! 3. once every required marker exists, archive or delete the file and
//!    remove its markers.
//!
//! A failed step leaves the markers as they were; the next run resumes at
//! the first incomplete step.

use std::path::Path;
use std::time::Instant;

use dispatch_core::audit::AuditFields;
use dispatch_core::control::{ControlFiles, Stage};
use dispatch_core::object_client::{ObjectClient, UploadOutcome};
use dispatch_core::observability::ticket_span;
use dispatch_core::ticket::{ArchiveName, archive_or_delete, base_name, count_tickets, pending_ticket_files};
use tracing::Instrument;

use crate::config::S3UploadConfig;
use crate::delivery::BrokerDelivery;
use crate::error::{Error, Result};
use crate::metrics;
use crate::outcome::{Delivered, FailureReason, FileOutcome, RunReport, SkipReason};

const ACTION: &str = "s3Upload";

/// Runs the object-store pipeline over one batch directory.
pub struct S3UploadPipeline<'a> {
    config: &'a S3UploadConfig,
    objects: ObjectClient,
    signaling: Option<BrokerDelivery>,
}

impl<'a> S3UploadPipeline<'a> {
    /// Creates the pipeline. `signaling` must be set when the configuration
    /// enables signaling.
    #[must_use]
    pub fn new(
        config: &'a S3UploadConfig,
        objects: ObjectClient,
        signaling: Option<BrokerDelivery>,
    ) -> Self {
        Self {
            config,
            objects,
            signaling,
        }
    }

    /// Processes every pending file of the batch directory.
    ///
    /// # Errors
    ///
    /// Returns an error only if the batch directory cannot be listed, or
    /// signaling is enabled without a broker. Per-file failures are recorded
    /// in the report.
    pub async fn run(&mut self) -> Result<RunReport> {
        if self.config.signaling.is_some() && self.signaling.is_none() {
            return Err(Error::Configuration {
                missing: vec!["broker for kafka signaling".into()],
            });
        }

        let files = pending_ticket_files(&self.config.batch_dir)?;
        tracing::info!(dir = %self.config.batch_dir.display(), files = files.len(), "starting upload batch");

        let mut report = RunReport::new();
        for path in files {
            let started = Instant::now();
            let span = ticket_span(ACTION, &path.display().to_string());
            let outcome = match self.process_file(&path).instrument(span).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "file not delivered");
                    FileOutcome::Failed(FailureReason::from(&err))
                }
            };
            metrics::record_file(ACTION, outcome.label(), started.elapsed().as_secs_f64());
            report.push(path, outcome);
        }

        tracing::info!(
            delivered = report.delivered(),
            skipped = report.skipped(),
            failed = report.failed(),
            "upload batch finished"
        );
        Ok(report)
    }

    async fn process_file(&mut self, path: &Path) -> Result<FileOutcome> {
        let control = ControlFiles::new(path);
        let file_name = base_name(path)?.to_string();
        let mut delivered = Delivered::default();

        if control.is_stage_done(Stage::DoneS3) {
            tracing::warn!(file = %path.display(), "upload already recorded, skipping upload");
        } else {
            if !path.exists() {
                tracing::warn!(file = %path.display(), "file does not exist");
                return Ok(FileOutcome::Skipped(SkipReason::Vanished));
            }

            let tickets = match count_tickets(path) {
                Ok(n) => Some(n),
                Err(err) => {
                    tracing::debug!(file = %path.display(), error = %err, "unable to count tickets");
                    None
                }
            };

            match self
                .objects
                .upload(path, &self.config.destination_dir)
                .await
                .map_err(|e| Error::delivery(format!("upload of {file_name}"), e))?
            {
                UploadOutcome::Verified(receipt) => {
                    tracing::info!(file = %path.display(), key = %receipt.key, "upload verified");
                }
                UploadOutcome::DigestMismatch { key, local, remote } => {
                    return Err(Error::Integrity {
                        key,
                        expected: local,
                        actual: remote,
                    });
                }
            }

            control
                .mark_stage_done(Stage::DoneS3)
                .map_err(|source| Error::Marker {
                    path: path.to_path_buf(),
                    source,
                })?;
            delivered.tickets = tickets;
            if let Some(n) = tickets {
                metrics::record_tickets(ACTION, n);
            }

            let fields = AuditFields::builder()
                .completed_now()
                .num_tickets(tickets.and_then(|n| i64::try_from(n).ok()).unwrap_or(-1))
                .output_slot(self.config.output_slot.clone())
                .build();
            self.audit(&file_name, &fields);
        }

        if let Some(signaling) = self.signaling.as_mut() {
            if control.is_stage_done(Stage::DoneKafka) {
                tracing::warn!(file = %path.display(), "signal already recorded, skipping signaling");
            } else {
                let message = serde_json::json!({ "FilePath": file_name }).to_string();
                signaling.send_single(message.as_bytes()).await?;
                let partition = signaling.audit_info().partition;
                delivered.partition = partition;

                let mut fields = AuditFields::builder().kafka_topic(signaling.topic());
                if let Some(partition) = partition {
                    fields = fields.kafka_partition(partition);
                }
                self.audit(&file_name, &fields.build());

                control
                    .mark_stage_done(Stage::DoneKafka)
                    .map_err(|source| Error::Marker {
                        path: path.to_path_buf(),
                        source,
                    })?;
            }
        }

        let signaled = self.signaling.is_none() || control.is_stage_done(Stage::DoneKafka);
        if !(control.is_stage_done(Stage::DoneS3) && signaled) {
            return Ok(FileOutcome::Skipped(SkipReason::Incomplete));
        }

        delivered.disposition = Some(self.finalize(path, &control)?);
        Ok(FileOutcome::Delivered(delivered))
    }

    fn finalize(
        &self,
        path: &Path,
        control: &ControlFiles,
    ) -> Result<dispatch_core::ticket::Disposition> {
        let finalize_err = |source| Error::Finalize {
            path: path.to_path_buf(),
            source,
        };
        let disposition = archive_or_delete(path, self.config.archive_dir.as_deref(), ArchiveName::Plain)
            .map_err(finalize_err)?;
        control.clear_stage(Stage::DoneS3).map_err(finalize_err)?;
        control.clear_stage(Stage::DoneKafka).map_err(finalize_err)?;
        tracing::debug!(file = %path.display(), ?disposition, "file finalized");
        Ok(disposition)
    }

    // Audit failures never undo a completed stage.
    fn audit(&self, file_name: &str, fields: &AuditFields) {
        if let Some(audit) = &self.config.audit {
            if let Err(err) = audit.append(file_name, fields) {
                tracing::warn!(file = %file_name, error = %err, "audit statement not stored");
            }
        }
    }
}
