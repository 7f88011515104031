//! Broker delivery engine.
//!
//! Two modes share one partition policy (pinned partition, else least-lag
//! selection):
//!
//! - [`BrokerDelivery::send_single`] produces one control message and waits
//!   for its acknowledgment.
//! - [`BrokerDelivery::send_file`] produces a ticket file line by line. Each
//!   line is acknowledged before the `.ctrl.kafka` cursor moves past it, so a
//!   crash resends at most the line in flight and never skips one.
//!
//! Once a pass reaches the end of the file, the file is archived (or deleted)
//! and its cursor removed. Completion is judged by comparing the running line
//! counter with the number of lines read in the same pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dispatch_core::broker::{Broker, ProduceAck};
use dispatch_core::control::ControlFiles;
use dispatch_core::partition::PartitionSelector;
use dispatch_core::ticket::{ArchiveName, Disposition, archive_or_delete};
use tokio::io::AsyncBufReadExt;

use crate::config::BrokerSettings;
use crate::error::{Error, Result};
use crate::metrics;

/// Counters describing the last delivery, for audit statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditInfo {
    /// Messages sent by the last delivery.
    pub num_tickets: u64,
    /// Partition used by the last delivery.
    pub partition: Option<i32>,
}

/// Result of a bulk file delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReport {
    /// Partition the lines went to.
    pub partition: i32,
    /// Lines produced by this call.
    pub lines_sent: u64,
    /// Lines read in this pass, including ones sent by an earlier run.
    pub lines_read: u64,
    /// Where the file went, when the pass completed it.
    pub disposition: Option<Disposition>,
}

/// Sends messages and ticket files to one topic.
pub struct BrokerDelivery {
    broker: Arc<dyn Broker>,
    topic: String,
    pinned: Option<i32>,
    selector: PartitionSelector,
    audit: AuditInfo,
}

impl std::fmt::Debug for BrokerDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerDelivery")
            .field("topic", &self.topic)
            .field("pinned", &self.pinned)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl BrokerDelivery {
    /// Creates a delivery engine for the configured topic.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, settings: &BrokerSettings) -> Self {
        Self {
            broker,
            topic: settings.topic.clone(),
            pinned: settings.partition,
            selector: settings.selector(),
            audit: AuditInfo::default(),
        }
    }

    /// Topic written to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Counters of the last delivery.
    #[must_use]
    pub fn audit_info(&self) -> AuditInfo {
        self.audit
    }

    async fn partition(&mut self) -> Result<i32> {
        match self.pinned {
            Some(partition) => Ok(partition),
            None => Ok(self.selector.select(self.broker.as_ref()).await?),
        }
    }

    async fn produce(&self, partition: i32, value: &[u8]) -> Result<ProduceAck> {
        let ack = self
            .broker
            .produce(&self.topic, partition, value)
            .await
            .map_err(|e| {
                Error::delivery(format!("produce to {}[{partition}]", self.topic), e)
            })?;
        metrics::record_broker_message(&self.topic);
        Ok(ack)
    }

    /// Produces one message and waits for the acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no partition can be selected, or a
    /// delivery error when the broker rejects the message.
    pub async fn send_single(&mut self, message: &[u8]) -> Result<ProduceAck> {
        let partition = self.partition().await?;
        tracing::debug!(topic = %self.topic, partition, "sending single message");

        let ack = self.produce(partition, message).await?;
        tracing::info!(
            topic = %self.topic,
            partition = ack.partition,
            offset = ack.offset,
            "message acknowledged"
        );

        self.audit = AuditInfo {
            num_tickets: 1,
            partition: Some(partition),
        };
        Ok(ack)
    }

    /// Produces every line of `path` not yet covered by its cursor.
    ///
    /// Reading stops at the first empty line. When the pass completes the
    /// file, it is moved to `archive_dir` as `<name>.<unix-seconds>` (or
    /// deleted) and the cursor is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, no partition
    /// can be selected, a line is not acknowledged, or the cursor cannot be
    /// stored. The cursor then still covers exactly the acknowledged lines.
    pub async fn send_file(&mut self, path: &Path, archive_dir: Option<&Path>) -> Result<BulkReport> {
        if !path.exists() {
            return Err(Error::TransientFile {
                path: path.to_path_buf(),
                reason: "file does not exist".into(),
            });
        }

        self.audit = AuditInfo::default();
        let partition = self.partition().await?;
        tracing::debug!(file = %path.display(), topic = %self.topic, partition, "sending file");

        let control = ControlFiles::new(path);
        let last_line = control.read_line_cursor().map_err(|source| Error::Marker {
            path: path.to_path_buf(),
            source,
        })?;

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| transient(path, &e))?;
        let mut lines = tokio::io::BufReader::new(file).lines();

        let mut current_line: u64 = 1;
        let mut lines_read: u64 = 0;
        let mut lines_sent: u64 = 0;
        while let Some(line) = lines.next_line().await.map_err(|e| transient(path, &e))? {
            if line.is_empty() {
                break;
            }
            lines_read += 1;

            if current_line > last_line {
                self.produce(partition, line.as_bytes()).await?;
                control
                    .advance_line_cursor(current_line)
                    .map_err(|source| Error::Marker {
                        path: path.to_path_buf(),
                        source,
                    })?;
                lines_sent += 1;
            }
            current_line += 1;
        }

        if last_line > 0 {
            tracing::info!(file = %path.display(), resumed_after = last_line, "resumed partial delivery");
        }

        let disposition = if current_line >= lines_read {
            Some(self.finalize(path, archive_dir, &control)?)
        } else {
            None
        };

        self.audit = AuditInfo {
            num_tickets: lines_sent,
            partition: Some(partition),
        };
        tracing::info!(
            file = %path.display(),
            topic = %self.topic,
            partition,
            lines_sent,
            "file sent"
        );

        Ok(BulkReport {
            partition,
            lines_sent,
            lines_read,
            disposition,
        })
    }

    fn finalize(
        &self,
        path: &Path,
        archive_dir: Option<&Path>,
        control: &ControlFiles,
    ) -> Result<Disposition> {
        let finalize_err = |source| Error::Finalize {
            path: path.to_path_buf(),
            source,
        };
        let disposition =
            archive_or_delete(path, archive_dir, ArchiveName::Timestamped).map_err(finalize_err)?;
        control.clear_cursor().map_err(finalize_err)?;
        Ok(disposition)
    }
}

fn transient(path: &Path, err: &std::io::Error) -> Error {
    Error::TransientFile {
        path: PathBuf::from(path),
        reason: err.to_string(),
    }
}
