//! Topic partition tuples used as both request and result shapes.

use std::{collections::HashMap, fmt, hash::Hash};

use crate::{error::KafkaError, offset::Offset};

/// A partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn with_offset(&self, offset: Offset) -> TopicPartitionOffset {
        TopicPartitionOffset {
            topic: self.topic.clone(),
            partition: self.partition,
            offset,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.topic, self.partition)
    }
}

/// A partition together with a position in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: Offset,
}

impl TopicPartitionOffset {
    pub fn new(topic: impl Into<String>, partition: i32, offset: impl Into<Offset>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset: offset.into(),
        }
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

impl fmt::Display for TopicPartitionOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] @{}", self.topic, self.partition, self.offset)
    }
}

/// The per-partition outcome of a request that carries no position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartitionError {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaError,
}

impl TopicPartitionError {
    pub fn new(topic_partition: &TopicPartition, error: KafkaError) -> Self {
        Self {
            topic: topic_partition.topic.clone(),
            partition: topic_partition.partition,
            error,
        }
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// The per-partition outcome of a request that carries a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartitionOffsetError {
    pub topic: String,
    pub partition: i32,
    pub offset: Offset,
    pub error: KafkaError,
}

impl TopicPartitionOffsetError {
    pub fn new(topic_partition_offset: &TopicPartitionOffset, error: KafkaError) -> Self {
        Self {
            topic: topic_partition_offset.topic.clone(),
            partition: topic_partition_offset.partition,
            offset: topic_partition_offset.offset,
            error,
        }
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    pub fn topic_partition_offset(&self) -> TopicPartitionOffset {
        TopicPartitionOffset::new(self.topic.clone(), self.partition, self.offset)
    }
}

/// A partition together with a timestamp to search for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartitionTimestamp {
    pub topic: String,
    pub partition: i32,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
}

impl TopicPartitionTimestamp {
    pub fn new(topic: impl Into<String>, partition: i32, timestamp: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            timestamp,
        }
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

/// Anything keyed by a topic partition.
pub trait PartitionKeyed: Clone {
    fn key(&self) -> TopicPartition;
}

impl PartitionKeyed for TopicPartition {
    fn key(&self) -> TopicPartition {
        self.clone()
    }
}

impl PartitionKeyed for TopicPartitionOffset {
    fn key(&self) -> TopicPartition {
        self.topic_partition()
    }
}

impl PartitionKeyed for TopicPartitionTimestamp {
    fn key(&self) -> TopicPartition {
        self.topic_partition()
    }
}

/// Collapse a request to one entry per distinct partition.
///
/// Entries keep the position of their first occurrence; a later duplicate
/// replaces the value stored there.
pub fn dedup_by_partition<T: PartitionKeyed>(entries: &[T]) -> Vec<T> {
    let mut index: HashMap<TopicPartition, usize> = HashMap::new();
    let mut deduped: Vec<T> = Vec::with_capacity(entries.len());

    for entry in entries {
        match index.get(&entry.key()) {
            Some(&position) => deduped[position] = entry.clone(),
            None => {
                index.insert(entry.key(), deduped.len());
                deduped.push(entry.clone());
            }
        }
    }

    deduped
}
