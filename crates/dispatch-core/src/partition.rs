//! Least-lag partition selection.
//!
//! Broker writes are spread by picking, for every delivery, a partition
//! whose consumer group backlog is smallest:
//!
//! 1. Without a consumer group, lag-based selection is skipped.
//! 2. Otherwise the topic's partition set is resolved once and cached for
//!    the life of the selector; each selection then reads every partition's
//!    committed offset and high watermark (`lag = watermark - committed`,
//!    unknown when the group never committed).
//! 3. Among partitions with a known lag, the minimum is found and one of the
//!    partitions reaching it is picked uniformly at random.
//! 4. Without usable lag data, a partition is drawn uniformly from
//!    `[0, partition_count)`.
//! 5. Without lag data and without a partition count, selection fails.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::broker::Broker;

/// Lag per partition. `None` means the group has no committed offset there.
pub type LagSnapshot = BTreeMap<i32, Option<i64>>;

/// Error raised when no partition can be chosen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Neither lag data nor a partition count is available.
    #[error("cannot select a partition for topic {topic}: no lag data and no partition count")]
    NoPartitionSource {
        /// Topic being written.
        topic: String,
    },
}

/// Returns the partitions whose known lag equals the minimum known lag.
///
/// Returns an empty vec if no partition has a known lag.
#[must_use]
pub fn least_lag_candidates(lags: &LagSnapshot) -> Vec<i32> {
    let Some(min) = lags.values().filter_map(|lag| *lag).min() else {
        return Vec::new();
    };
    lags.iter()
        .filter(|(_, lag)| **lag == Some(min))
        .map(|(partition, _)| *partition)
        .collect()
}

/// Picks uniformly among the least-lagged partitions.
pub fn choose_least_lag<R: Rng + ?Sized>(lags: &LagSnapshot, rng: &mut R) -> Option<i32> {
    least_lag_candidates(lags).choose(rng).copied()
}

/// Partition selector for one topic.
#[derive(Debug, Clone)]
pub struct PartitionSelector {
    topic: String,
    consumer_group: Option<String>,
    partition_count: Option<u32>,
    partitions: Option<Vec<i32>>,
}

impl PartitionSelector {
    /// Creates a selector. `partition_count` bounds the random fallback.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        consumer_group: Option<String>,
        partition_count: Option<u32>,
    ) -> Self {
        Self {
            topic: topic.into(),
            consumer_group,
            partition_count,
            partitions: None,
        }
    }

    /// Topic this selector routes for.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Reads the current lag of every partition.
    ///
    /// Returns `None` when lag-based selection is unavailable: no consumer
    /// group, unknown topic, or a broker lookup failed. Failures are logged.
    pub async fn lag_snapshot(&mut self, broker: &dyn Broker) -> Option<LagSnapshot> {
        let group = self.consumer_group.clone()?;

        if self.partitions.is_none() {
            match broker.topic_partitions(&self.topic).await {
                Ok(Some(partitions)) => self.partitions = Some(partitions),
                Ok(None) => {
                    tracing::error!(topic = %self.topic, "topic not found in cluster");
                    return None;
                }
                Err(err) => {
                    tracing::warn!(topic = %self.topic, error = %err, "partition metadata unavailable");
                    return None;
                }
            }
        }
        let partitions = self.partitions.as_deref().unwrap_or_default();

        let mut lags = LagSnapshot::new();
        for &partition in partitions {
            let committed = match broker.committed_offset(&group, &self.topic, partition).await {
                Ok(offset) => offset,
                Err(err) => {
                    tracing::warn!(topic = %self.topic, partition, error = %err, "committed offset unavailable");
                    return None;
                }
            };
            let high = match broker.high_watermark(&self.topic, partition).await {
                Ok(high) => high,
                Err(err) => {
                    tracing::warn!(topic = %self.topic, partition, error = %err, "high watermark unavailable");
                    return None;
                }
            };
            let lag = committed.map(|offset| high - offset);
            tracing::debug!(
                topic = %self.topic,
                partition,
                committed = ?committed,
                high_watermark = high,
                lag = ?lag,
                "partition lag"
            );
            lags.insert(partition, lag);
        }

        if lags.is_empty() {
            tracing::warn!(topic = %self.topic, group = %group, "no partitions to compute lag on");
            return None;
        }
        Some(lags)
    }

    /// Selects the partition for the next delivery.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoPartitionSource`] when neither lag data
    /// nor a partition count is available.
    pub async fn select(&mut self, broker: &dyn Broker) -> Result<i32, SelectionError> {
        let snapshot = self.lag_snapshot(broker).await;
        let mut rng = rand::thread_rng();
        self.pick(snapshot.as_ref(), &mut rng)
    }

    /// Picks a partition from an already computed snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoPartitionSource`] when neither lag data
    /// nor a partition count is available.
    pub fn pick<R: Rng + ?Sized>(
        &self,
        snapshot: Option<&LagSnapshot>,
        rng: &mut R,
    ) -> Result<i32, SelectionError> {
        if let Some(partition) = snapshot.and_then(|lags| choose_least_lag(lags, rng)) {
            tracing::debug!(topic = %self.topic, partition, "least-lag partition selected");
            return Ok(partition);
        }

        match self.partition_count {
            Some(count) if count > 0 => {
                let partition = rng.gen_range(0..count);
                tracing::debug!(topic = %self.topic, partition, "random partition selected");
                i32::try_from(partition).map_err(|_| SelectionError::NoPartitionSource {
                    topic: self.topic.clone(),
                })
            }
            _ => Err(SelectionError::NoPartitionSource {
                topic: self.topic.clone(),
            }),
        }
    }
}
