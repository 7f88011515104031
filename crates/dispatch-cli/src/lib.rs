//! # dispatch-cli
//!
//! Command-line interface of the ticket dispatcher.
//!
//! ## Actions
//!
//! - `dispatcher --action s3Upload ...` - Upload ticket files to the object store
//! - `dispatcher --action kafkaUpload ...` - Send ticket files line by line to Kafka
//! - `dispatcher --action s3RenameObject ...` - Rename one object
//! - `dispatcher --action help` / `--action version`
//!
//! ## Configuration
//!
//! Every parameter is a long flag and can also be set through a `DISPATCH_*`
//! environment variable, e.g. `DISPATCH_S3_SECRET_KEY` or
//! `DISPATCH_KAFKA_PASSWORD`.
//!
//! ## Exit codes
//!
//! - `0` - every file delivered or skipped
//! - `1` - the run could not start
//! - `2` - the run completed but at least one file failed

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use dispatch_core::broker::Broker;
use dispatch_core::observability::{LogFormat, LoggingConfig};
use dispatch_core::storage::{ObjectStoreBackend, S3Settings, StorageBackend};
use dispatch_engine::{Action, Backends, BrokerSettings, EXIT_OK, Params, Plan, VERSION};

/// Ticket dispatcher - delivers batch files to an object store and Kafka.
#[derive(Debug, Parser)]
#[command(name = "dispatcher")]
#[command(author, version = VERSION, about, long_about = None)]
pub struct Cli {
    /// Action to run: s3Upload, kafkaUpload, s3RenameObject, help, version.
    #[arg(long, env = "DISPATCH_ACTION", default_value = "help", value_parser = parse_action)]
    pub action: Action,

    /// Log level: trace, debug, info, warn, error, or 4 (info) to 8 (trace).
    #[arg(long, env = "DISPATCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr.
    #[arg(long, env = "DISPATCH_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log output format.
    #[arg(long, env = "DISPATCH_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Write audit statements.
    #[arg(long, env = "DISPATCH_AUDIT_ENABLED")]
    pub audit_enabled: bool,

    /// Signal each uploaded file on Kafka.
    #[arg(long, env = "DISPATCH_KAFKA_SIGNALING_ENABLED")]
    pub kafka_signaling_enabled: bool,

    /// Pipeline parameters.
    #[command(flatten)]
    pub params: ParamArgs,
}

/// Pipeline parameter flags.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ParamArgs {
    /// Archive directory for delivered files; files are deleted when unset.
    #[arg(long, env = "DISPATCH_ARCHIVE_DIR")]
    pub archive_dir: Option<String>,
    /// JSON object of regex to replacement applied to audited file names.
    #[arg(long, env = "DISPATCH_AUDIT_FILE_NAME_SUBSTITUTIONS")]
    pub audit_file_name_substitutions: Option<String>,
    /// Audit column prefix.
    #[arg(long, env = "DISPATCH_AUDIT_LABEL")]
    pub audit_label: Option<String>,
    /// Audit log directory.
    #[arg(long, env = "DISPATCH_AUDIT_ROOT")]
    pub audit_root: Option<String>,
    /// Audit scope.
    #[arg(long, env = "DISPATCH_AUDIT_SCOPE")]
    pub audit_scope: Option<String>,
    /// Zone of audit timestamps.
    #[arg(long, env = "DISPATCH_AUDIT_TIMEZONE")]
    pub audit_timezone: Option<String>,
    /// Any path inside the batch directory.
    #[arg(long, env = "DISPATCH_FILE_PATH")]
    pub file_path: Option<String>,
    /// Kafka bootstrap servers.
    #[arg(long, env = "DISPATCH_KAFKA_BOOTSTRAP_SERVERS")]
    pub kafka_bootstrap_servers: Option<String>,
    /// Kafka client id.
    #[arg(long, env = "DISPATCH_KAFKA_CLIENT_ID")]
    pub kafka_client_id: Option<String>,
    /// Consumer group whose lag drives partition selection.
    #[arg(long, env = "DISPATCH_KAFKA_CONSUMER_GROUP_ID")]
    pub kafka_consumer_group_id: Option<String>,
    /// Number of partitions for random selection.
    #[arg(long, env = "DISPATCH_KAFKA_NUM_PARTITIONS")]
    pub kafka_num_partitions: Option<String>,
    /// Fixed partition.
    #[arg(long, env = "DISPATCH_KAFKA_PARTITION")]
    pub kafka_partition: Option<String>,
    /// Kafka SASL password.
    #[arg(long, env = "DISPATCH_KAFKA_PASSWORD", hide_env_values = true)]
    pub kafka_password: Option<String>,
    /// Kafka topic.
    #[arg(long, env = "DISPATCH_KAFKA_TOPIC")]
    pub kafka_topic: Option<String>,
    /// Kafka SASL username.
    #[arg(long, env = "DISPATCH_KAFKA_USERNAME")]
    pub kafka_username: Option<String>,
    /// Output label.
    #[arg(long, env = "DISPATCH_OUTPUT_LABEL")]
    pub output_label: Option<String>,
    /// Output slot.
    #[arg(long, env = "DISPATCH_OUTPUT_SLOT")]
    pub output_slot: Option<String>,
    /// Pod level.
    #[arg(long, env = "DISPATCH_POD_LEVEL")]
    pub pod_level: Option<String>,
    /// S3 access key.
    #[arg(long, env = "DISPATCH_S3_ACCESS_KEY")]
    pub s3_access_key: Option<String>,
    /// S3 bucket.
    #[arg(long, env = "DISPATCH_S3_BUCKET")]
    pub s3_bucket: Option<String>,
    /// Key prefix of uploaded objects.
    #[arg(long, env = "DISPATCH_S3_DESTINATION_DIR")]
    pub s3_destination_dir: Option<String>,
    /// S3 endpoint URL.
    #[arg(long, env = "DISPATCH_S3_ENDPOINT_URL")]
    pub s3_endpoint_url: Option<String>,
    /// Object to rename.
    #[arg(long, env = "DISPATCH_S3_OBJECT_NAME")]
    pub s3_object_name: Option<String>,
    /// New name of the object.
    #[arg(long, env = "DISPATCH_S3_OBJECT_NAME_NEW")]
    pub s3_object_name_new: Option<String>,
    /// S3 secret key.
    #[arg(long, env = "DISPATCH_S3_SECRET_KEY", hide_env_values = true)]
    pub s3_secret_key: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// JSON output.
    Json,
}

fn parse_action(raw: &str) -> std::result::Result<Action, String> {
    raw.parse::<Action>().map_err(|e| e.to_string())
}

impl Cli {
    /// Logging settings.
    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            format: match self.log_format {
                LogFormatArg::Pretty => LogFormat::Pretty,
                LogFormatArg::Json => LogFormat::Json,
            },
            level: self.log_level.clone(),
            file: self.log_file.clone(),
        }
    }

    /// Parameter bag handed to the dispatcher.
    #[must_use]
    pub fn params(&self) -> Params {
        let p = self.params.clone();
        Params {
            archive_dir: p.archive_dir,
            audit_enabled: self.audit_enabled,
            audit_file_name_substitutions: p.audit_file_name_substitutions,
            audit_label: p.audit_label,
            audit_root: p.audit_root,
            audit_scope: p.audit_scope,
            audit_timezone: p.audit_timezone,
            file_path: p.file_path,
            kafka_bootstrap_servers: p.kafka_bootstrap_servers,
            kafka_client_id: p.kafka_client_id,
            kafka_consumer_group_id: p.kafka_consumer_group_id,
            kafka_num_partitions: p.kafka_num_partitions,
            kafka_partition: p.kafka_partition,
            kafka_password: p.kafka_password,
            kafka_signaling_enabled: self.kafka_signaling_enabled,
            kafka_topic: p.kafka_topic,
            kafka_username: p.kafka_username,
            output_label: p.output_label,
            output_slot: p.output_slot,
            pod_level: p.pod_level,
            s3_access_key: p.s3_access_key,
            s3_bucket: p.s3_bucket,
            s3_destination_dir: p.s3_destination_dir,
            s3_endpoint_url: p.s3_endpoint_url,
            s3_object_name: p.s3_object_name,
            s3_object_name_new: p.s3_object_name_new,
            s3_secret_key: p.s3_secret_key,
        }
    }
}

/// Production backends: S3 through `object_store`, Kafka through `rdkafka`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliBackends;

impl Backends for CliBackends {
    fn storage(&self, settings: &S3Settings) -> dispatch_core::Result<Arc<dyn StorageBackend>> {
        Ok(Arc::new(ObjectStoreBackend::s3(settings)?))
    }

    #[cfg(feature = "kafka")]
    fn broker(&self, settings: &BrokerSettings) -> dispatch_core::Result<Arc<dyn Broker>> {
        let broker = dispatch_core::kafka::KafkaBroker::connect(dispatch_core::kafka::KafkaSettings {
            bootstrap_servers: settings.bootstrap_servers.clone(),
            client_id: settings.client_id.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })?;
        Ok(Arc::new(broker))
    }

    #[cfg(not(feature = "kafka"))]
    fn broker(&self, settings: &BrokerSettings) -> dispatch_core::Result<Arc<dyn Broker>> {
        Err(dispatch_core::Error::broker(format!(
            "cannot reach {}: dispatcher built without the kafka feature",
            settings.bootstrap_servers
        )))
    }
}

/// Validates and runs the selected action, returning the process exit code.
///
/// `help` and `version` print to stdout and return `0`.
///
/// # Errors
///
/// Returns an error when the run cannot start: invalid parameters, backend
/// construction, runtime start-up or an unreadable batch directory.
pub fn run(cli: &Cli, backends: &dyn Backends) -> Result<u8> {
    let plan = cli
        .action
        .validate(&cli.params())
        .with_context(|| format!("invalid parameters for action {}", cli.action))?;

    match plan {
        Plan::Help => {
            println!("{}", Cli::command().render_long_help());
            return Ok(EXIT_OK);
        }
        Plan::Version => {
            println!("dispatcher {VERSION}");
            return Ok(EXIT_OK);
        }
        _ => {}
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let report = runtime
        .block_on(plan.execute(backends))
        .with_context(|| format!("action {} aborted", cli.action))?;

    for file in report.files() {
        tracing::debug!(file = %file.path.display(), outcome = file.outcome.label(), "file outcome");
    }
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_engine::Error;

    #[test]
    fn test_parses_camel_case_actions() {
        let cli = Cli::parse_from(["dispatcher", "--action", "s3RenameObject"]);
        assert_eq!(cli.action, Action::S3RenameObject);

        let cli = Cli::parse_from(["dispatcher"]);
        assert_eq!(cli.action, Action::Help);

        assert!(Cli::try_parse_from(["dispatcher", "--action", "upload"]).is_err());
    }

    #[test]
    fn test_flags_fill_params() {
        let cli = Cli::parse_from([
            "dispatcher",
            "--action",
            "kafkaUpload",
            "--audit-enabled",
            "--file-path",
            "/data/in/x.txt",
            "--kafka-topic",
            "tickets-1",
            "--kafka-partition",
            "0",
            "--log-level",
            "5",
            "--log-format",
            "json",
        ]);

        let params = cli.params();
        assert!(params.audit_enabled);
        assert!(!params.kafka_signaling_enabled);
        assert_eq!(params.file_path.as_deref(), Some("/data/in/x.txt"));
        assert_eq!(params.kafka_topic.as_deref(), Some("tickets-1"));
        assert_eq!(params.kafka_partition.as_deref(), Some("0"));

        let logging = cli.logging();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level.as_deref(), Some("5"));
    }

    #[test]
    fn test_help_and_version_exit_ok() {
        for action in ["help", "version"] {
            let cli = Cli::parse_from(["dispatcher", "--action", action]);
            assert_eq!(run(&cli, &CliBackends).unwrap(), EXIT_OK);
        }
    }

    #[test]
    fn test_missing_parameters_abort_before_running() {
        let cli = Cli::parse_from(["dispatcher", "--action", "s3Upload", "--s3-bucket", "b"]);
        let err = run(&cli, &CliBackends).unwrap_err();
        let Some(Error::Configuration { missing }) = err.downcast_ref::<Error>() else {
            panic!("expected configuration error, got {err:#}");
        };
        assert!(missing.iter().any(|m| m == "file-path"));
        assert!(!missing.iter().any(|m| m == "s3-bucket"));
    }

    #[test]
    fn test_s3_backend_builds_without_network() {
        let settings = S3Settings {
            endpoint_url: "http://127.0.0.1:9".into(),
            bucket: "tickets".into(),
            access_key: "a".into(),
            secret_key: "s".into(),
        };
        assert!(CliBackends.storage(&settings).is_ok());
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn test_kafka_upload_without_kafka_feature_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let file_path = dir.path().join("a.txt").display().to_string();
        let cli = Cli::parse_from([
            "dispatcher",
            "--action",
            "kafkaUpload",
            "--file-path",
            file_path.as_str(),
            "--kafka-bootstrap-servers",
            "broker:9092",
            "--kafka-client-id",
            "dispatcher",
            "--kafka-username",
            "u",
            "--kafka-password",
            "p",
            "--kafka-topic",
            "tickets-1",
            "--kafka-partition",
            "0",
            "--output-label",
            "out",
            "--output-slot",
            "1",
            "--pod-level",
            "1",
        ]);

        let err = run(&cli, &CliBackends).unwrap_err();
        assert!(format!("{err:#}").contains("kafka feature"));
        assert!(dir.path().join("a.txt").exists());
    }
}
