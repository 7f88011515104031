//! Bulk broker pipeline: every pending ticket file is sent line by line.

use std::path::Path;
use std::time::Instant;

use dispatch_core::audit::AuditFields;
use dispatch_core::observability::ticket_span;
use dispatch_core::ticket::{base_name, pending_ticket_files};
use tracing::Instrument;

use crate::config::KafkaUploadConfig;
use crate::delivery::BrokerDelivery;
use crate::error::Result;
use crate::metrics;
use crate::outcome::{Delivered, FailureReason, FileOutcome, RunReport, SkipReason};

const ACTION: &str = "kafkaUpload";

/// Runs the bulk broker pipeline over one batch directory.
#[derive(Debug)]
pub struct KafkaUploadPipeline<'a> {
    config: &'a KafkaUploadConfig,
    delivery: BrokerDelivery,
}

impl<'a> KafkaUploadPipeline<'a> {
    /// Creates the pipeline.
    #[must_use]
    pub fn new(config: &'a KafkaUploadConfig, delivery: BrokerDelivery) -> Self {
        Self { config, delivery }
    }

    /// Sends every pending file of the batch directory, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the batch directory cannot be listed.
    pub async fn run(&mut self) -> Result<RunReport> {
        let files = pending_ticket_files(&self.config.batch_dir)?;
        tracing::info!(
            dir = %self.config.batch_dir.display(),
            files = files.len(),
            topic = %self.delivery.topic(),
            "starting bulk batch"
        );

        let mut report = RunReport::new();
        for path in files {
            let started = Instant::now();
            let span = ticket_span(ACTION, &path.display().to_string());
            let outcome = match self.process_file(&path).instrument(span).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(
                        file = %path.display(),
                        topic = %self.delivery.topic(),
                        error = %err,
                        "error sending messages from file"
                    );
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
            "bulk batch finished"
        );
        Ok(report)
    }

    async fn process_file(&mut self, path: &Path) -> Result<FileOutcome> {
        if !path.exists() {
            tracing::warn!(file = %path.display(), "file does not exist");
            return Ok(FileOutcome::Skipped(SkipReason::Vanished));
        }
        let file_name = base_name(path)?.to_string();

        let sent = self
            .delivery
            .send_file(path, self.config.archive_dir.as_deref())
            .await?;
        metrics::record_tickets(ACTION, sent.lines_sent);

        if let Some(audit) = &self.config.audit {
            let fields = AuditFields::builder()
                .completed_now()
                .num_tickets(i64::try_from(sent.lines_sent).unwrap_or(i64::MAX))
                .output_slot(self.config.output_slot.clone())
                .kafka_topic(self.delivery.topic())
                .kafka_partition(sent.partition)
                .build();
            if let Err(err) = audit.append(&file_name, &fields) {
                tracing::warn!(file = %file_name, error = %err, "audit statement not stored");
            }
        }

        Ok(match sent.disposition {
            Some(disposition) => FileOutcome::Delivered(Delivered {
                tickets: Some(sent.lines_sent),
                partition: Some(sent.partition),
                disposition: Some(disposition),
            }),
            None => FileOutcome::Skipped(SkipReason::Incomplete),
        })
    }
}
