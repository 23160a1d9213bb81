//! The transport handle the consumer engine drives.
//!
//! A transport owns the broker connections, dispatches requests and keeps
//! one internal event queue per client instance. Everything the brokers
//! push at the client (records, partition EOF markers, rebalance
//! notifications, commit acknowledgements, errors, statistics, logs) comes
//! out of that queue, in order, through [`Transport::poll`].
//!
//! Implementations must be thread-safe: the consume loop polls from the
//! caller's thread while offset queries and commits run on blocking workers
//! against the same handle. Each request is expected to be serialized by the
//! implementation.

use std::{fmt::Debug, sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{
    config::ClientConfig,
    error::{KafkaError, Result},
    message::{CommittedOffsets, Headers, LogMessage, Timestamp},
    offset::Offset,
    topic_partition::{
        TopicPartition, TopicPartitionError, TopicPartitionOffset, TopicPartitionOffsetError,
        TopicPartitionTimestamp,
    },
};

/// A record as fetched by the transport, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: Offset,
    pub timestamp: Timestamp,
    pub headers: Headers,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    /// Set when the record could not be read correctly, e.g. a corrupt batch.
    pub error: KafkaError,
}

/// Partition ownership changes requested by the group coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Rebalance {
    Assign(Vec<TopicPartition>),
    Revoke(Vec<TopicPartition>),
}

/// One entry of the transport's event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Record(Record),
    /// The consumer caught up with the high-water mark. Carries the next offset.
    PartitionEof(TopicPartitionOffset),
    Rebalance(Rebalance),
    OffsetsCommitted(CommittedOffsets),
    /// Advisory broker or connectivity error.
    Error(KafkaError),
    /// JSON formatted statistics.
    Statistics(String),
    Log(LogMessage),
}

/// The operations the consumer engine needs from a broker transport.
pub trait Transport: Send + Sync + Debug {
    /// Name of this client instance.
    fn name(&self) -> String;

    /// Take the next event off the queue, waiting up to `timeout`.
    fn poll(&self, timeout: Duration) -> Option<Event>;

    /// Join the group and ask for partitions of `topics`.
    fn subscribe(&self, topics: &[String]) -> Result<()>;

    fn unsubscribe(&self) -> Result<()>;

    fn subscription(&self) -> Vec<String>;

    /// Replace the set of fetched partitions.
    ///
    /// Concrete offsets and the `BEGINNING` / `END` / tail sentinels are
    /// fetched from directly. `INVALID` and `STORED` resume from the group's
    /// committed offset, or the reset policy when nothing was committed.
    fn assign(&self, partitions: &[TopicPartitionOffset]) -> Result<()>;

    /// Move the fetch cursor of a partition that is being fetched.
    fn seek(&self, partition: &TopicPartitionOffset) -> Result<()>;

    fn pause(&self, partitions: &[TopicPartition]) -> Vec<TopicPartitionError>;

    fn resume(&self, partitions: &[TopicPartition]) -> Vec<TopicPartitionError>;

    /// Commit and wait for the coordinator's answer.
    ///
    /// The outcome is also queued as an [`Event::OffsetsCommitted`].
    fn commit(&self, offsets: &[TopicPartitionOffset]) -> Result<Vec<TopicPartitionOffsetError>>;

    /// Commit without waiting. The outcome only arrives as an
    /// [`Event::OffsetsCommitted`] on the queue.
    fn commit_queued(&self, offsets: Vec<TopicPartitionOffset>);

    /// Offsets last acknowledged by the coordinator, `INVALID` when none.
    fn committed(
        &self,
        partitions: &[TopicPartition],
        timeout: Duration,
    ) -> Result<Vec<TopicPartitionOffsetError>>;

    /// Earliest offset whose timestamp is at or after the requested one,
    /// `INVALID` when no such record exists.
    fn offsets_for_times(
        &self,
        timestamps: &[TopicPartitionTimestamp],
        timeout: Duration,
    ) -> Result<Vec<TopicPartitionOffsetError>>;

    /// Member id given by the group coordinator, empty outside a group.
    fn member_id(&self) -> String;

    /// Leave the group. A revocation for the current assignment may be
    /// queued as a side effect.
    fn close(&self) -> Result<()>;
}

/// Builds a transport from the configuration left after the client-local
/// keys were taken out.
pub trait Connect {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn Transport>>;
}
