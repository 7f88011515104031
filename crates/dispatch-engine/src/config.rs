//! Immutable, validated configurations for each pipeline.
//!
//! Built from a [`Params`] bag once required parameters are known to be
//! present; components receive them by reference.

use std::path::PathBuf;

use chrono_tz::Tz;
use dispatch_core::audit::{
    AuditFields, AuditLedger, DEFAULT_AUDIT_ROOT, DEFAULT_AUDIT_TIMEZONE, FileNameRewriter,
};
use dispatch_core::partition::PartitionSelector;
use dispatch_core::storage::S3Settings;
use dispatch_core::ticket::batch_dir;

use crate::error::{Error, Result};
use crate::params::{Params, names};

fn required(params: &Params, name: &str) -> Result<String> {
    params
        .get(name)
        .map(str::to_string)
        .ok_or_else(|| Error::Configuration {
            missing: vec![name.to_string()],
        })
}

fn optional(params: &Params, name: &str) -> Option<String> {
    params.get(name).map(str::to_string)
}

fn parse_opt<T: std::str::FromStr>(params: &Params, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    params
        .get(name)
        .map(|raw| raw.parse::<T>().map_err(|e| Error::invalid(name, e.to_string())))
        .transpose()
}

/// Labels identifying the producer of a run in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLabels {
    /// Output label.
    pub output_label: String,
    /// Pod level.
    pub pod_level: String,
}

impl RunLabels {
    fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            output_label: required(params, names::OUTPUT_LABEL)?,
            pod_level: required(params, names::POD_LEVEL)?,
        })
    }

    /// Label attached to the action span.
    #[must_use]
    pub fn span_label(&self) -> String {
        format!("{}/{}", self.output_label, self.pod_level)
    }
}

/// Audit ledger settings.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Directory of the audit logs.
    pub root: PathBuf,
    /// Audit scope.
    pub scope: String,
    /// Column prefix.
    pub label: String,
    /// Zone used for completion timestamps.
    pub timezone: Tz,
    /// Rewrites applied to file names before auditing.
    pub rewriter: FileNameRewriter,
}

impl AuditSettings {
    /// Reads audit settings; `None` when auditing is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing label/scope, an unknown zone or an
    /// unusable substitution set.
    pub fn from_params(params: &Params) -> Result<Option<Self>> {
        if !params.audit_enabled {
            return Ok(None);
        }

        let timezone = match params.get(names::AUDIT_TIMEZONE) {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|e| Error::invalid(names::AUDIT_TIMEZONE, e.to_string()))?,
            None => DEFAULT_AUDIT_TIMEZONE,
        };
        let rewriter = match params.get(names::AUDIT_FILE_NAME_SUBSTITUTIONS) {
            Some(raw) => FileNameRewriter::from_json(raw)
                .map_err(|e| Error::invalid(names::AUDIT_FILE_NAME_SUBSTITUTIONS, e.to_string()))?,
            None => FileNameRewriter::default(),
        };

        Ok(Some(Self {
            root: PathBuf::from(
                params
                    .get(names::AUDIT_ROOT)
                    .unwrap_or(DEFAULT_AUDIT_ROOT),
            ),
            scope: required(params, names::AUDIT_SCOPE)?,
            label: required(params, names::AUDIT_LABEL)?,
            timezone,
            rewriter,
        }))
    }

    /// Builds the ledger writer.
    #[must_use]
    pub fn ledger(&self) -> AuditLedger {
        AuditLedger::new(&self.root, &self.scope, &self.label).with_timezone(self.timezone)
    }

    /// Name under which a ticket file is audited.
    #[must_use]
    pub fn audit_name(&self, file_name: &str) -> String {
        self.rewriter.apply(file_name)
    }

    /// Appends a statement for a ticket file, under its rewritten name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuditWrite`] when the statement is empty or the log
    /// cannot be written.
    pub fn append(&self, file_name: &str, fields: &AuditFields) -> Result<PathBuf> {
        Ok(self
            .ledger()
            .append_statement(&self.audit_name(file_name), fields)?)
    }
}

/// Broker connection and routing settings.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Bootstrap servers.
    pub bootstrap_servers: String,
    /// Client id.
    pub client_id: String,
    /// SASL username.
    pub username: Option<String>,
    /// SASL password.
    pub password: Option<String>,
    /// Topic written to.
    pub topic: String,
    /// Pinned partition; skips selection when set.
    pub partition: Option<i32>,
    /// Partition count for the random fallback.
    pub num_partitions: Option<u32>,
    /// Consumer group whose lag drives selection.
    pub consumer_group: Option<String>,
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("num_partitions", &self.num_partitions)
            .field("consumer_group", &self.consumer_group)
            .finish()
    }
}

impl BrokerSettings {
    /// Reads broker settings.
    ///
    /// # Errors
    ///
    /// Returns an error for missing connection parameters, a non-numeric
    /// partition or partition count, or neither of the two.
    pub fn from_params(params: &Params) -> Result<Self> {
        let partition = parse_opt::<i32>(params, names::KAFKA_PARTITION)?;
        if partition.is_some_and(|p| p < 0) {
            return Err(Error::invalid(names::KAFKA_PARTITION, "must not be negative"));
        }
        let num_partitions = parse_opt::<u32>(params, names::KAFKA_NUM_PARTITIONS)?;
        if partition.is_none() && num_partitions.is_none() {
            return Err(Error::Configuration {
                missing: vec![format!(
                    "{} or {}",
                    names::KAFKA_PARTITION,
                    names::KAFKA_NUM_PARTITIONS
                )],
            });
        }

        Ok(Self {
            bootstrap_servers: required(params, names::KAFKA_BOOTSTRAP_SERVERS)?,
            client_id: required(params, names::KAFKA_CLIENT_ID)?,
            username: optional(params, names::KAFKA_USERNAME),
            password: optional(params, names::KAFKA_PASSWORD),
            topic: required(params, names::KAFKA_TOPIC)?,
            partition,
            num_partitions,
            consumer_group: optional(params, names::KAFKA_CONSUMER_GROUP_ID),
        })
    }

    /// Builds the partition selector for the topic.
    #[must_use]
    pub fn selector(&self) -> PartitionSelector {
        PartitionSelector::new(
            self.topic.clone(),
            self.consumer_group.clone(),
            self.num_partitions,
        )
    }
}

fn s3_settings(params: &Params) -> Result<S3Settings> {
    Ok(S3Settings {
        endpoint_url: required(params, names::S3_ENDPOINT_URL)?,
        bucket: required(params, names::S3_BUCKET)?,
        access_key: required(params, names::S3_ACCESS_KEY)?,
        secret_key: required(params, names::S3_SECRET_KEY)?,
    })
}

/// Configuration of the object-store upload pipeline.
#[derive(Debug, Clone)]
pub struct S3UploadConfig {
    /// Run labels.
    pub labels: RunLabels,
    /// Directory scanned for ticket files.
    pub batch_dir: PathBuf,
    /// Archive directory; files are deleted when absent.
    pub archive_dir: Option<PathBuf>,
    /// Output slot recorded in audit statements.
    pub output_slot: String,
    /// Object store connection.
    pub s3: S3Settings,
    /// Key prefix of uploaded objects.
    pub destination_dir: String,
    /// Audit settings, when auditing is enabled.
    pub audit: Option<AuditSettings>,
    /// Broker settings, when signaling is enabled.
    pub signaling: Option<BrokerSettings>,
}

impl S3UploadConfig {
    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration or invalid parameter error.
    pub fn from_params(params: &Params) -> Result<Self> {
        let signaling = if params.kafka_signaling_enabled {
            Some(BrokerSettings::from_params(params)?)
        } else {
            None
        };
        Ok(Self {
            labels: RunLabels::from_params(params)?,
            batch_dir: batch_dir(&PathBuf::from(required(params, names::FILE_PATH)?)),
            archive_dir: optional(params, names::ARCHIVE_DIR).map(PathBuf::from),
            output_slot: required(params, names::OUTPUT_SLOT)?,
            s3: s3_settings(params)?,
            destination_dir: required(params, names::S3_DESTINATION_DIR)?,
            audit: AuditSettings::from_params(params)?,
            signaling,
        })
    }
}

/// Configuration of the bulk broker upload pipeline.
#[derive(Debug, Clone)]
pub struct KafkaUploadConfig {
    /// Run labels.
    pub labels: RunLabels,
    /// Directory scanned for ticket files.
    pub batch_dir: PathBuf,
    /// Archive directory; files are deleted when absent.
    pub archive_dir: Option<PathBuf>,
    /// Output slot recorded in audit statements.
    pub output_slot: String,
    /// Broker settings.
    pub broker: BrokerSettings,
    /// Audit settings, when auditing is enabled.
    pub audit: Option<AuditSettings>,
}

impl KafkaUploadConfig {
    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration or invalid parameter error.
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            labels: RunLabels::from_params(params)?,
            batch_dir: batch_dir(&PathBuf::from(required(params, names::FILE_PATH)?)),
            archive_dir: optional(params, names::ARCHIVE_DIR).map(PathBuf::from),
            output_slot: required(params, names::OUTPUT_SLOT)?,
            broker: BrokerSettings::from_params(params)?,
            audit: AuditSettings::from_params(params)?,
        })
    }
}

/// Configuration of the object rename action.
#[derive(Debug, Clone)]
pub struct S3RenameConfig {
    /// Object store connection.
    pub s3: S3Settings,
    /// Existing key.
    pub old_key: String,
    /// New key.
    pub new_key: String,
}

impl S3RenameConfig {
    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a missing parameter.
    pub fn from_params(params: &Params) -> Result<Self> {
        Ok(Self {
            s3: s3_settings(params)?,
            old_key: required(params, names::S3_OBJECT_NAME)?,
            new_key: required(params, names::S3_OBJECT_NAME_NEW)?,
        })
    }
}
