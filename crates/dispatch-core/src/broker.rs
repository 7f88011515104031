//! Message broker abstraction.
//!
//! The dispatcher needs four things from a partitioned broker: acknowledged
//! produce to an explicit partition, a consumer group's committed offset, a
//! partition's high watermark, and the partition set of a topic. The
//! [`Broker`] trait captures exactly that. [`MemoryBroker`] backs tests; the
//! Kafka implementation lives in [`crate::kafka`] behind the `kafka` feature.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Header attached to every message produced by the dispatcher.
pub const BULK_MODE_HEADER: (&str, &str) = ("isBulkMode", "00");

/// Broker acknowledgment for one produced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceAck {
    /// Partition the broker stored the message in.
    pub partition: i32,
    /// Offset assigned to the message.
    pub offset: i64,
}

/// Partitioned message broker.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Produces one message and waits for the broker's acknowledgment.
    async fn produce(&self, topic: &str, partition: i32, value: &[u8]) -> Result<ProduceAck>;

    /// Returns the offset committed by `group` on a partition, or `None` when
    /// the group has never committed there.
    async fn committed_offset(&self, group: &str, topic: &str, partition: i32)
    -> Result<Option<i64>>;

    /// Returns the high watermark (next offset to be written) of a partition.
    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64>;

    /// Returns the sorted partition ids of `topic`, or `None` if the topic is
    /// unknown to the cluster.
    async fn topic_partitions(&self, topic: &str) -> Result<Option<Vec<i32>>>;
}

/// A message stored by [`MemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Topic name.
    pub topic: String,
    /// Partition id.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Message payload.
    pub value: Bytes,
}

#[derive(Debug, Default)]
struct MemoryState {
    topics: BTreeMap<String, Vec<Vec<Bytes>>>,
    committed: HashMap<(String, String, i32), i64>,
    log: Vec<StoredMessage>,
    produce_budget: Option<usize>,
    metadata_fails: bool,
}

/// In-memory broker for tests.
///
/// Topics must be declared with [`MemoryBroker::with_topic`]. Produce
/// failures can be injected after a number of successful sends to simulate a
/// crash in the middle of a bulk delivery.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a topic with `partitions` empty partitions.
    #[must_use]
    pub fn with_topic(self, topic: impl Into<String>, partitions: usize) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .topics
                .insert(topic.into(), vec![Vec::new(); partitions]);
        }
        self
    }

    /// Appends `count` placeholder messages to a partition to move its
    /// high watermark without touching the produce log.
    pub fn preload(&self, topic: &str, partition: i32, count: usize) {
        let mut state = self.lock_state();
        if let Some(parts) = state.topics.get_mut(topic) {
            if let Some(log) = usize::try_from(partition).ok().and_then(|p| parts.get_mut(p)) {
                log.extend(std::iter::repeat_n(Bytes::new(), count));
            }
        }
    }

    /// Records a committed offset for a consumer group.
    pub fn commit(&self, group: &str, topic: &str, partition: i32, offset: i64) {
        self.lock_state()
            .committed
            .insert((group.to_string(), topic.to_string(), partition), offset);
    }

    /// Lets the next `n` produce calls succeed, then fails every later one.
    pub fn fail_produce_after(&self, n: usize) {
        self.lock_state().produce_budget = Some(n);
    }

    /// Removes any produce failure injection.
    pub fn clear_failures(&self) {
        let mut state = self.lock_state();
        state.produce_budget = None;
        state.metadata_fails = false;
    }

    /// Makes partition metadata lookups fail.
    pub fn fail_metadata(&self) {
        self.lock_state().metadata_fails = true;
    }

    /// Returns every message produced through [`Broker::produce`], in order.
    #[must_use]
    pub fn produced(&self) -> Vec<StoredMessage> {
        self.lock_state().log.clone()
    }

    /// Returns the number of successful produce calls.
    #[must_use]
    pub fn produce_count(&self) -> usize {
        self.lock_state().log.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only happens after a panicking test thread.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn produce(&self, topic: &str, partition: i32, value: &[u8]) -> Result<ProduceAck> {
        let mut state = self.lock_state();

        if let Some(budget) = state.produce_budget.as_mut() {
            if *budget == 0 {
                return Err(Error::broker(format!(
                    "injected delivery failure on {topic}[{partition}]"
                )));
            }
            *budget -= 1;
        }

        let log = state
            .topics
            .get_mut(topic)
            .and_then(|parts| usize::try_from(partition).ok().and_then(|p| parts.get_mut(p)))
            .ok_or_else(|| Error::broker(format!("unknown partition {topic}[{partition}]")))?;

        let offset = i64::try_from(log.len()).map_err(|_| Error::Internal {
            message: "partition offset overflow".into(),
        })?;
        let value = Bytes::copy_from_slice(value);
        log.push(value.clone());
        state.log.push(StoredMessage {
            topic: topic.to_string(),
            partition,
            offset,
            value,
        });

        Ok(ProduceAck { partition, offset })
    }

    async fn committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<Option<i64>> {
        let state = self.lock_state();
        if state.metadata_fails {
            return Err(Error::broker("injected metadata failure"));
        }
        Ok(state
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied())
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> Result<i64> {
        let state = self.lock_state();
        if state.metadata_fails {
            return Err(Error::broker("injected metadata failure"));
        }
        state
            .topics
            .get(topic)
            .and_then(|parts| usize::try_from(partition).ok().and_then(|p| parts.get(p)))
            .map(|log| i64::try_from(log.len()).unwrap_or(i64::MAX))
            .ok_or_else(|| Error::broker(format!("unknown partition {topic}[{partition}]")))
    }

    async fn topic_partitions(&self, topic: &str) -> Result<Option<Vec<i32>>> {
        let state = self.lock_state();
        if state.metadata_fails {
            return Err(Error::broker("injected metadata failure"));
        }
        Ok(state.topics.get(topic).map(|parts| {
            (0..parts.len())
                .filter_map(|p| i32::try_from(p).ok())
                .collect()
        }))
    }
}
