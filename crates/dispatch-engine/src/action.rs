//! Action dispatcher.
//!
//! An [`Action`] names one pipeline. [`Action::validate`] checks every
//! required parameter up front and reports all missing names at once; it
//! returns a [`Plan`] carrying the pipeline's immutable configuration.
//! [`Plan::execute`] then runs exactly one pipeline against backends supplied
//! by a [`Backends`] implementation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use dispatch_core::broker::Broker;
use dispatch_core::object_client::ObjectClient;
use dispatch_core::observability::action_span;
use dispatch_core::storage::{S3Settings, StorageBackend};
use tracing::Instrument;

use crate::config::{BrokerSettings, KafkaUploadConfig, S3RenameConfig, S3UploadConfig};
use crate::delivery::BrokerDelivery;
use crate::error::{Error, Result};
use crate::kafka_upload::KafkaUploadPipeline;
use crate::outcome::RunReport;
use crate::params::{Params, names};
use crate::rename::rename_object;
use crate::s3_upload::S3UploadPipeline;

/// Version reported by the `version` action.
pub const VERSION: &str = "1.1 [Nov 2025]";

const AUDIT_PARAMS: &[&str] = &[names::AUDIT_LABEL, names::AUDIT_SCOPE];

const SIGNALING_PARAMS: &[&str] = &[
    names::KAFKA_BOOTSTRAP_SERVERS,
    names::KAFKA_CLIENT_ID,
    names::KAFKA_PASSWORD,
    names::KAFKA_TOPIC,
    names::KAFKA_USERNAME,
];

const S3_UPLOAD_PARAMS: &[&str] = &[
    names::OUTPUT_LABEL,
    names::OUTPUT_SLOT,
    names::POD_LEVEL,
    names::FILE_PATH,
    names::S3_ACCESS_KEY,
    names::S3_BUCKET,
    names::S3_DESTINATION_DIR,
    names::S3_ENDPOINT_URL,
    names::S3_SECRET_KEY,
];

const KAFKA_UPLOAD_PARAMS: &[&str] = &[
    names::KAFKA_BOOTSTRAP_SERVERS,
    names::KAFKA_CLIENT_ID,
    names::KAFKA_PASSWORD,
    names::KAFKA_TOPIC,
    names::KAFKA_USERNAME,
    names::OUTPUT_LABEL,
    names::OUTPUT_SLOT,
    names::POD_LEVEL,
    names::FILE_PATH,
];

const S3_RENAME_PARAMS: &[&str] = &[
    names::S3_ACCESS_KEY,
    names::S3_BUCKET,
    names::S3_ENDPOINT_URL,
    names::S3_OBJECT_NAME,
    names::S3_OBJECT_NAME_NEW,
    names::S3_SECRET_KEY,
];

/// Dispatcher actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Print usage.
    Help,
    /// Print the version.
    Version,
    /// Send ticket files line by line to the broker.
    KafkaUpload,
    /// Rename one object.
    S3RenameObject,
    /// Upload ticket files to the object store, optionally signaling the broker.
    S3Upload,
}

impl Action {
    /// All actions.
    pub const ALL: [Self; 5] = [
        Self::Help,
        Self::Version,
        Self::KafkaUpload,
        Self::S3RenameObject,
        Self::S3Upload,
    ];

    /// Name as given on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Version => "version",
            Self::KafkaUpload => "kafkaUpload",
            Self::S3RenameObject => "s3RenameObject",
            Self::S3Upload => "s3Upload",
        }
    }

    /// Parameters this action needs with the given switches, in report order.
    ///
    /// The "one of partition / partition count" group is not included; see
    /// [`Action::missing_params`].
    #[must_use]
    pub fn required_params(self, params: &Params) -> Vec<&'static str> {
        let mut required: Vec<&'static str> = match self {
            Self::Help | Self::Version => Vec::new(),
            Self::KafkaUpload => KAFKA_UPLOAD_PARAMS.to_vec(),
            Self::S3RenameObject => S3_RENAME_PARAMS.to_vec(),
            Self::S3Upload => S3_UPLOAD_PARAMS.to_vec(),
        };
        if matches!(self, Self::KafkaUpload | Self::S3Upload) && params.audit_enabled {
            required.extend_from_slice(AUDIT_PARAMS);
        }
        if self == Self::S3Upload && params.kafka_signaling_enabled {
            for name in SIGNALING_PARAMS {
                if !required.contains(name) {
                    required.push(*name);
                }
            }
        }
        required
    }

    fn needs_partition_source(self, params: &Params) -> bool {
        match self {
            Self::KafkaUpload => true,
            Self::S3Upload => params.kafka_signaling_enabled,
            _ => false,
        }
    }

    /// Every missing parameter for this action, in report order.
    #[must_use]
    pub fn missing_params(self, params: &Params) -> Vec<String> {
        let mut missing: Vec<String> = self
            .required_params(params)
            .into_iter()
            .filter(|name| !params.is_set(name))
            .map(str::to_string)
            .collect();
        if self.needs_partition_source(params)
            && !params.is_set(names::KAFKA_PARTITION)
            && !params.is_set(names::KAFKA_NUM_PARTITIONS)
        {
            missing.push(format!(
                "{} or {}",
                names::KAFKA_PARTITION,
                names::KAFKA_NUM_PARTITIONS
            ));
        }
        missing
    }

    /// Validates parameters and builds the execution plan.
    ///
    /// Nothing is touched on disk or over the network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] listing every missing parameter, or
    /// [`Error::InvalidParameter`] for an unusable value.
    pub fn validate(self, params: &Params) -> Result<Plan> {
        let missing = self.missing_params(params);
        if !missing.is_empty() {
            for name in &missing {
                tracing::error!(action = self.as_str(), parameter = %name, "missing argument");
            }
            return Err(Error::Configuration { missing });
        }

        Ok(match self {
            Self::Help => Plan::Help,
            Self::Version => Plan::Version,
            Self::KafkaUpload => Plan::KafkaUpload(KafkaUploadConfig::from_params(params)?),
            Self::S3RenameObject => Plan::S3RenameObject(S3RenameConfig::from_params(params)?),
            Self::S3Upload => Plan::S3Upload(S3UploadConfig::from_params(params)?),
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::invalid("action", format!("unknown action {s:?}")))
    }
}

/// Constructs the external collaborators a plan needs.
pub trait Backends {
    /// Object store for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    fn storage(&self, settings: &S3Settings) -> dispatch_core::Result<Arc<dyn StorageBackend>>;

    /// Broker for the given cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    fn broker(&self, settings: &BrokerSettings) -> dispatch_core::Result<Arc<dyn Broker>>;
}

/// A validated action, ready to run.
#[derive(Debug, Clone)]
pub enum Plan {
    /// Print usage.
    Help,
    /// Print the version.
    Version,
    /// Bulk broker upload.
    KafkaUpload(KafkaUploadConfig),
    /// Object rename.
    S3RenameObject(S3RenameConfig),
    /// Object-store upload.
    S3Upload(S3UploadConfig),
}

impl Plan {
    /// Action this plan runs.
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Self::Help => Action::Help,
            Self::Version => Action::Version,
            Self::KafkaUpload(_) => Action::KafkaUpload,
            Self::S3RenameObject(_) => Action::S3RenameObject,
            Self::S3Upload(_) => Action::S3Upload,
        }
    }

    /// Label for the action span.
    #[must_use]
    pub fn span_label(&self) -> String {
        match self {
            Self::KafkaUpload(c) => c.labels.span_label(),
            Self::S3Upload(c) => c.labels.span_label(),
            Self::S3RenameObject(c) => c.s3.bucket.clone(),
            Self::Help | Self::Version => String::new(),
        }
    }

    /// Runs the pipeline.
    ///
    /// `Help` and `Version` do nothing here and return an empty report; the
    /// caller prints their text.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be built or the batch directory
    /// cannot be listed. Per-file failures are in the report.
    pub async fn execute(&self, backends: &dyn Backends) -> Result<RunReport> {
        let span = action_span(self.action().as_str(), &self.span_label());
        self.run(backends).instrument(span).await
    }

    async fn run(&self, backends: &dyn Backends) -> Result<RunReport> {
        match self {
            Self::Help | Self::Version => Ok(RunReport::new()),
            Self::KafkaUpload(config) => {
                let broker = backends.broker(&config.broker)?;
                let delivery = BrokerDelivery::new(broker, &config.broker);
                KafkaUploadPipeline::new(config, delivery).run().await
            }
            Self::S3RenameObject(config) => {
                let objects = ObjectClient::new(backends.storage(&config.s3)?);
                Ok(rename_object(&objects, config).await)
            }
            Self::S3Upload(config) => {
                let objects = ObjectClient::new(backends.storage(&config.s3)?);
                let signaling = match &config.signaling {
                    Some(settings) => Some(BrokerDelivery::new(backends.broker(settings)?, settings)),
                    None => None,
                };
                S3UploadPipeline::new(config, objects, signaling).run().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("s3upload".parse::<Action>().is_err());
    }

    #[test]
    fn every_missing_parameter_is_reported() {
        let params = Params {
            file_path: Some("/in/x".into()),
            s3_bucket: Some("b".into()),
            ..Params::default()
        };
        let Err(Error::Configuration { missing }) = Action::S3Upload.validate(&params) else {
            panic!("expected configuration error");
        };
        assert_eq!(
            missing,
            vec![
                "output-label",
                "output-slot",
                "pod-level",
                "s3-access-key",
                "s3-destination-dir",
                "s3-endpoint-url",
                "s3-secret-key",
            ]
        );
    }

    #[test]
    fn switches_add_conditional_groups() {
        let params = Params {
            audit_enabled: true,
            kafka_signaling_enabled: true,
            ..Params::default()
        };
        let missing = Action::S3Upload.missing_params(&params);
        for name in [
            "audit-label",
            "audit-scope",
            "kafka-bootstrap-servers",
            "kafka-topic",
            "kafka-partition or kafka-num-partitions",
        ] {
            assert!(missing.iter().any(|m| m == name), "{name} not reported");
        }

        let without = Action::S3Upload.missing_params(&Params::default());
        assert!(!without.iter().any(|m| m.starts_with("kafka") || m.starts_with("audit")));
    }

    #[test]
    fn kafka_upload_requires_partition_source() {
        let missing = Action::KafkaUpload.missing_params(&Params::default());
        assert_eq!(
            missing.last().map(String::as_str),
            Some("kafka-partition or kafka-num-partitions")
        );
    }

    #[test]
    fn rename_needs_only_object_parameters() {
        let params = Params {
            s3_access_key: Some("a".into()),
            s3_bucket: Some("b".into()),
            s3_endpoint_url: Some("http://minio:9000".into()),
            s3_object_name: Some("x".into()),
            s3_object_name_new: Some("y".into()),
            s3_secret_key: Some("s".into()),
            ..Params::default()
        };
        let plan = Action::S3RenameObject.validate(&params).unwrap();
        assert_eq!(plan.action(), Action::S3RenameObject);
    }

    #[test]
    fn help_and_version_need_nothing() {
        assert!(matches!(Action::Help.validate(&Params::default()), Ok(Plan::Help)));
        assert!(matches!(Action::Version.validate(&Params::default()), Ok(Plan::Version)));
    }
}
