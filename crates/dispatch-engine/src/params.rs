//! Raw parameter bag handed to the action dispatcher.
//!
//! Every field is optional here; which ones are required depends on the
//! action and on the audit/signaling switches, and is checked by
//! [`crate::action::Action::validate`].

use std::fmt;

/// Parameter names as spelled on the command line.
pub mod names {
    /// Archive directory for delivered files.
    pub const ARCHIVE_DIR: &str = "archive-dir";
    /// Audit file name substitutions (JSON).
    pub const AUDIT_FILE_NAME_SUBSTITUTIONS: &str = "audit-file-name-substitutions";
    /// Audit label (column prefix).
    pub const AUDIT_LABEL: &str = "audit-label";
    /// Audit log directory.
    pub const AUDIT_ROOT: &str = "audit-root";
    /// Audit scope.
    pub const AUDIT_SCOPE: &str = "audit-scope";
    /// Audit timestamp zone.
    pub const AUDIT_TIMEZONE: &str = "audit-timezone";
    /// Any path inside the batch directory.
    pub const FILE_PATH: &str = "file-path";
    /// Kafka bootstrap servers.
    pub const KAFKA_BOOTSTRAP_SERVERS: &str = "kafka-bootstrap-servers";
    /// Kafka client id.
    pub const KAFKA_CLIENT_ID: &str = "kafka-client-id";
    /// Consumer group whose lag drives partition selection.
    pub const KAFKA_CONSUMER_GROUP_ID: &str = "kafka-consumer-group-id";
    /// Partition count for the random fallback.
    pub const KAFKA_NUM_PARTITIONS: &str = "kafka-num-partitions";
    /// Pinned partition.
    pub const KAFKA_PARTITION: &str = "kafka-partition";
    /// Kafka SASL password.
    pub const KAFKA_PASSWORD: &str = "kafka-password";
    /// Kafka topic.
    pub const KAFKA_TOPIC: &str = "kafka-topic";
    /// Kafka SASL username.
    pub const KAFKA_USERNAME: &str = "kafka-username";
    /// Output label.
    pub const OUTPUT_LABEL: &str = "output-label";
    /// Output slot recorded in audit statements.
    pub const OUTPUT_SLOT: &str = "output-slot";
    /// Pod level.
    pub const POD_LEVEL: &str = "pod-level";
    /// S3 access key.
    pub const S3_ACCESS_KEY: &str = "s3-access-key";
    /// S3 bucket.
    pub const S3_BUCKET: &str = "s3-bucket";
    /// Destination prefix for uploads.
    pub const S3_DESTINATION_DIR: &str = "s3-destination-dir";
    /// S3 endpoint URL.
    pub const S3_ENDPOINT_URL: &str = "s3-endpoint-url";
    /// Object to rename.
    pub const S3_OBJECT_NAME: &str = "s3-object-name";
    /// New object name.
    pub const S3_OBJECT_NAME_NEW: &str = "s3-object-name-new";
    /// S3 secret key.
    pub const S3_SECRET_KEY: &str = "s3-secret-key";
}

/// Parameters of one invocation.
#[derive(Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Params {
    pub archive_dir: Option<String>,
    pub audit_enabled: bool,
    pub audit_file_name_substitutions: Option<String>,
    pub audit_label: Option<String>,
    pub audit_root: Option<String>,
    pub audit_scope: Option<String>,
    pub audit_timezone: Option<String>,
    pub file_path: Option<String>,
    pub kafka_bootstrap_servers: Option<String>,
    pub kafka_client_id: Option<String>,
    pub kafka_consumer_group_id: Option<String>,
    pub kafka_num_partitions: Option<String>,
    pub kafka_partition: Option<String>,
    pub kafka_password: Option<String>,
    pub kafka_signaling_enabled: bool,
    pub kafka_topic: Option<String>,
    pub kafka_username: Option<String>,
    pub output_label: Option<String>,
    pub output_slot: Option<String>,
    pub pod_level: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_destination_dir: Option<String>,
    pub s3_endpoint_url: Option<String>,
    pub s3_object_name: Option<String>,
    pub s3_object_name_new: Option<String>,
    pub s3_secret_key: Option<String>,
}

impl Params {
    /// Returns the value of a parameter by its command-line name.
    ///
    /// Blank values count as absent. Unknown names return `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            names::ARCHIVE_DIR => &self.archive_dir,
            names::AUDIT_FILE_NAME_SUBSTITUTIONS => &self.audit_file_name_substitutions,
            names::AUDIT_LABEL => &self.audit_label,
            names::AUDIT_ROOT => &self.audit_root,
            names::AUDIT_SCOPE => &self.audit_scope,
            names::AUDIT_TIMEZONE => &self.audit_timezone,
            names::FILE_PATH => &self.file_path,
            names::KAFKA_BOOTSTRAP_SERVERS => &self.kafka_bootstrap_servers,
            names::KAFKA_CLIENT_ID => &self.kafka_client_id,
            names::KAFKA_CONSUMER_GROUP_ID => &self.kafka_consumer_group_id,
            names::KAFKA_NUM_PARTITIONS => &self.kafka_num_partitions,
            names::KAFKA_PARTITION => &self.kafka_partition,
            names::KAFKA_PASSWORD => &self.kafka_password,
            names::KAFKA_TOPIC => &self.kafka_topic,
            names::KAFKA_USERNAME => &self.kafka_username,
            names::OUTPUT_LABEL => &self.output_label,
            names::OUTPUT_SLOT => &self.output_slot,
            names::POD_LEVEL => &self.pod_level,
            names::S3_ACCESS_KEY => &self.s3_access_key,
            names::S3_BUCKET => &self.s3_bucket,
            names::S3_DESTINATION_DIR => &self.s3_destination_dir,
            names::S3_ENDPOINT_URL => &self.s3_endpoint_url,
            names::S3_OBJECT_NAME => &self.s3_object_name,
            names::S3_OBJECT_NAME_NEW => &self.s3_object_name_new,
            names::S3_SECRET_KEY => &self.s3_secret_key,
            _ => return None,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// True if the parameter has a non-blank value.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Params")
            .field("file_path", &self.file_path)
            .field("archive_dir", &self.archive_dir)
            .field("output_label", &self.output_label)
            .field("output_slot", &self.output_slot)
            .field("pod_level", &self.pod_level)
            .field("audit_enabled", &self.audit_enabled)
            .field("audit_label", &self.audit_label)
            .field("audit_scope", &self.audit_scope)
            .field("s3_endpoint_url", &self.s3_endpoint_url)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_destination_dir", &self.s3_destination_dir)
            .field("s3_access_key", &redact(&self.s3_access_key))
            .field("s3_secret_key", &redact(&self.s3_secret_key))
            .field("kafka_signaling_enabled", &self.kafka_signaling_enabled)
            .field("kafka_bootstrap_servers", &self.kafka_bootstrap_servers)
            .field("kafka_topic", &self.kafka_topic)
            .field("kafka_partition", &self.kafka_partition)
            .field("kafka_num_partitions", &self.kafka_num_partitions)
            .field("kafka_consumer_group_id", &self.kafka_consumer_group_id)
            .field("kafka_username", &self.kafka_username)
            .field("kafka_password", &redact(&self.kafka_password))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_absent() {
        let params = Params {
            s3_bucket: Some("  ".into()),
            kafka_topic: Some("tickets-1".into()),
            ..Params::default()
        };
        assert!(!params.is_set(names::S3_BUCKET));
        assert_eq!(params.get(names::KAFKA_TOPIC), Some("tickets-1"));
        assert_eq!(params.get("no-such-param"), None);
    }

    #[test]
    fn debug_hides_secrets() {
        let params = Params {
            s3_secret_key: Some("s3cr3t".into()),
            kafka_password: Some("hunter2".into()),
            ..Params::default()
        };
        let rendered = format!("{params:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(!rendered.contains("hunter2"));
    }
}
