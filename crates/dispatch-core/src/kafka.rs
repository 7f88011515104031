//! Kafka implementation of [`Broker`] on top of librdkafka.
//!
//! Produce goes through a `FutureProducer` with `acks=all`; awaiting the
//! send future is the acknowledgment. Lag lookups use one `BaseConsumer` per
//! consumer group, created on first use. Those calls block, so they run on
//! tokio's blocking pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};

use crate::broker::{BULK_MODE_HEADER, Broker, ProduceAck};
use crate::error::{Error, Result};

/// Timeout applied to metadata and offset lookups.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery timeout handed to the producer.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// CA bundle used for SASL connections.
const CA_LOCATION: &str = "/etc/ssl/certs/ca-certificates.crt";

/// Connection settings for a Kafka cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Comma-separated bootstrap servers.
    pub bootstrap_servers: String,
    /// Client id reported to the brokers.
    pub client_id: String,
    /// SASL username. SCRAM is used only when both credentials are set.
    pub username: Option<String>,
    /// SASL password.
    pub password: Option<String>,
}

impl std::fmt::Debug for KafkaSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSettings")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl KafkaSettings {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id);

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config
                .set("ssl.ca.location", CA_LOCATION)
                .set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanism", "SCRAM-SHA-256")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }
        config
    }
}

/// Kafka-backed broker.
pub struct KafkaBroker {
    settings: KafkaSettings,
    producer: FutureProducer,
    consumers: Mutex<HashMap<String, Arc<BaseConsumer>>>,
}

impl std::fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl KafkaBroker {
    /// Creates the producer. Consumers are created lazily per group.
    ///
    /// # Errors
    ///
    /// Returns `Error::Broker` if librdkafka rejects the configuration.
    pub fn connect(settings: KafkaSettings) -> Result<Self> {
        let mut config = settings.client_config();
        config
            .set("acks", "all")
            .set("message.timeout.ms", DELIVERY_TIMEOUT.as_millis().to_string());
        if settings.username.is_some() && settings.password.is_some() {
            config.set("linger.ms", "1").set("retries", "3");
        }

        let producer: FutureProducer = config
            .create()
            .map_err(|e| Error::broker_with_source("failed to create producer", e))?;

        Ok(Self {
            settings,
            producer,
            consumers: Mutex::new(HashMap::new()),
        })
    }

    fn consumer(&self, group: &str) -> Result<Arc<BaseConsumer>> {
        let mut consumers = self.consumers.lock().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        if let Some(existing) = consumers.get(group) {
            return Ok(Arc::clone(existing));
        }

        let consumer: BaseConsumer = self
            .settings
            .client_config()
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| Error::broker_with_source("failed to create consumer", e))?;
        let consumer = Arc::new(consumer);
        consumers.insert(group.to_string(), Arc::clone(&consumer));
        drop(consumers);
        Ok(consumer)
    }

    fn any_consumer(&self) -> Result<Arc<BaseConsumer>> {
        let existing = self
            .consumers
            .lock()
            .map_err(|_| Error::Internal {
                message: "lock poisoned".into(),
            })?
            .values()
            .next()
            .cloned();
        match existing {
            Some(consumer) => Ok(consumer),
            None => self.consumer(&format!("{}-metadata", self.settings.client_id)),
        }
    }
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| Error::Internal {
            message: format!("blocking broker call panicked: {e}"),
        })?
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn produce(&self, topic: &str, partition: i32, value: &[u8]) -> Result<ProduceAck> {
        let headers = OwnedHeaders::new().insert(Header {
            key: BULK_MODE_HEADER.0,
            value: Some(BULK_MODE_HEADER.1),
        });
        let record = FutureRecord::<(), [u8]>::to(topic)
            .partition(partition)
            .payload(value)
            .headers(headers);

        match self.producer.send(record, DELIVERY_TIMEOUT).await {
            Ok((partition, offset)) => {
                tracing::trace!(topic, partition, offset, "message acknowledged");
                Ok(ProduceAck { partition, offset })
            }
            Err((err, _)) => Err(Error::broker_with_source(
                format!("delivery to {topic}[{partition}] failed"),
                err,
            )),
        }
    }

    async fn committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<Option<i64>> {
        let consumer = self.consumer(group)?;
        let topic = topic.to_string();
        blocking(move || {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition(&topic, partition);
            let committed = consumer
                .committed_offsets(tpl, METADATA_TIMEOUT)
                .map_err(|e| Error::broker_with_source("committed offset lookup failed", e))?;
            Ok(committed
                .find_partition(&topic, partition)
                .and_then(|elem| match elem.offset() {
                    Offset::Offset(offset) => Some(offset),
                    _ => None,
                }))
        })
        .await
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64> {
        let consumer = self.any_consumer()?;
        let topic = topic.to_string();
        blocking(move || {
            let (_low, high) = consumer
                .fetch_watermarks(&topic, partition, METADATA_TIMEOUT)
                .map_err(|e| Error::broker_with_source("watermark lookup failed", e))?;
            Ok(high)
        })
        .await
    }

    async fn topic_partitions(&self, topic: &str) -> Result<Option<Vec<i32>>> {
        let consumer = self.any_consumer()?;
        let topic = topic.to_string();
        blocking(move || {
            let metadata = consumer
                .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
                .map_err(|e| Error::broker_with_source("metadata lookup failed", e))?;
            let Some(found) = metadata.topics().iter().find(|t| t.name() == topic) else {
                return Ok(None);
            };
            if found.error().is_some() || found.partitions().is_empty() {
                return Ok(None);
            }
            let mut ids: Vec<i32> = found.partitions().iter().map(|p| p.id()).collect();
            ids.sort_unstable();
            Ok(Some(ids))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let settings = KafkaSettings {
            bootstrap_servers: "kafka:9092".into(),
            client_id: "dispatcher".into(),
            username: Some("svc".into()),
            password: Some("hunter2".into()),
        };
        let rendered = format!("{settings:?}");
        assert!(rendered.contains("kafka:9092"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn sasl_only_with_both_credentials() {
        let mut settings = KafkaSettings {
            bootstrap_servers: "kafka:9092".into(),
            client_id: "dispatcher".into(),
            username: Some("svc".into()),
            password: None,
        };
        assert!(settings.client_config().get("security.protocol").is_none());

        settings.password = Some("pw".into());
        assert_eq!(
            settings.client_config().get("security.protocol"),
            Some("SASL_PLAINTEXT")
        );
    }
}
