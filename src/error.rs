//! Error types for the consumer engine.
//!
//! Three layers of failure are modelled here:
//! - [`KafkaCode`] is a single numeric code, either returned by a broker
//!   (non-negative, plus `Unknown`) or raised locally by the client
//!   (the `Local*` variants, which reuse librdkafka's negative numbering).
//! - [`KafkaError`] pairs a code with an optional human readable reason.
//!   It is what per-record and per-partition outcomes carry.
//! - [`Error`] is what a fallible call on the client returns.

use std::fmt;

use bytes::Bytes;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

use crate::{
    message::{Message, Timestamp},
    topic_partition::{TopicPartitionError, TopicPartitionOffset, TopicPartitionOffsetError},
};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a call made on the client.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration handed to the builder was rejected.
    #[error("configuration error: {0}")]
    Config(String),
    /// A caller supplied an argument that can never succeed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The call is not valid in the client's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A single error raised by the transport or the broker.
    #[error("{0}")]
    Kafka(KafkaError),
    /// A record could not be delivered. Carries the raw record.
    #[error("{0}")]
    Consume(Box<ConsumeError>),
    /// At least one partition of a request failed. Holds every outcome.
    #[error("request failed for {} of {} partitions", failed_partitions(.0), .0.len())]
    TopicPartitionErrors(Vec<TopicPartitionError>),
    /// At least one partition of an offset request failed. Holds every outcome.
    #[error("request failed for {} of {} partitions", failed_offsets(.0), .0.len())]
    TopicPartitionOffsetErrors(Vec<TopicPartitionOffsetError>),
    /// The operation observed a cancellation request.
    #[error("operation was cancelled")]
    Cancelled,
    /// A worker running a blocking transport call did not complete.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

fn failed_partitions(outcomes: &[TopicPartitionError]) -> usize {
    outcomes.iter().filter(|p| p.error.is_error()).count()
}

fn failed_offsets(outcomes: &[TopicPartitionOffsetError]) -> usize {
    outcomes.iter().filter(|p| p.error.is_error()).count()
}

impl Error {
    /// The code behind this error, when there is a single one.
    pub fn code(&self) -> Option<KafkaCode> {
        match self {
            Error::Kafka(err) => Some(err.code()),
            Error::Consume(err) => Some(err.error().code()),
            _ => None,
        }
    }
}

impl From<KafkaCode> for Error {
    fn from(code: KafkaCode) -> Self {
        Error::Kafka(KafkaError::new(code))
    }
}

impl From<KafkaError> for Error {
    fn from(err: KafkaError) -> Self {
        Error::Kafka(err)
    }
}

impl From<ConsumeError> for Error {
    fn from(err: ConsumeError) -> Self {
        Error::Consume(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("ERROR: blocking worker failed {:?}", err);
        Error::TaskFailed(err.to_string())
    }
}

/// Undecoded form of a record, used when delivery fails.
pub type RawMessage = Message<Option<Bytes>, Option<Bytes>>;

/// A record that could not be delivered to the application.
///
/// The raw key and value are always kept so the caller can inspect,
/// replay or skip the record. The position points at the failed record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeError {
    pub topic_partition_offset_error: TopicPartitionOffsetError,
    pub message: Option<RawMessage>,
}

impl ConsumeError {
    pub fn error(&self) -> &KafkaError {
        &self.topic_partition_offset_error.error
    }

    pub fn topic_partition_offset(&self) -> TopicPartitionOffset {
        self.topic_partition_offset_error.topic_partition_offset()
    }

    pub fn raw_key(&self) -> Option<&Bytes> {
        self.message.as_ref().and_then(|message| message.key.as_ref())
    }

    pub fn raw_value(&self) -> Option<&Bytes> {
        self.message
            .as_ref()
            .and_then(|message| message.value.as_ref())
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.message.as_ref().map(|message| message.timestamp)
    }
}

impl fmt::Display for ConsumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tpoe = &self.topic_partition_offset_error;
        write!(
            f,
            "consume error on {} [{}] @{}: {}",
            tpoe.topic, tpoe.partition, tpoe.offset, tpoe.error
        )
    }
}

impl std::error::Error for ConsumeError {}

/// A code paired with an optional reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaError {
    code: KafkaCode,
    reason: Option<String>,
}

impl KafkaError {
    pub fn new(code: KafkaCode) -> Self {
        Self { code, reason: None }
    }

    pub fn with_reason(code: KafkaCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: Some(reason.into()),
        }
    }

    pub fn no_error() -> Self {
        Self::new(KafkaCode::None)
    }

    pub fn code(&self) -> KafkaCode {
        self.code
    }

    /// The explicit reason if one was given, otherwise the code's description.
    pub fn reason(&self) -> String {
        match &self.reason {
            Some(reason) => reason.clone(),
            None => self.code.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.code != KafkaCode::None
    }

    pub fn is_local(&self) -> bool {
        self.code.is_local()
    }

    pub fn is_broker(&self) -> bool {
        self.is_error() && !self.code.is_local()
    }
}

impl Default for KafkaError {
    fn default() -> Self {
        Self::no_error()
    }
}

impl From<KafkaCode> for KafkaError {
    fn from(code: KafkaCode) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for KafkaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({})", self.code, reason),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Broker and client error codes.
///
/// Broker codes follow the Kafka protocol numbering. Client side codes are
/// negative and are never sent on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(i16)]
pub enum KafkaCode {
    /// Received message is incorrect.
    LocalBadMsg = -199,
    /// Generic local failure.
    LocalFail = -196,
    /// Broker transport failure.
    LocalTransport = -195,
    /// All broker connections are down.
    LocalAllBrokersDown = -187,
    /// Reached the end of a partition.
    LocalPartitionEof = -191,
    /// Partition is not known, or not part of the current assignment.
    LocalUnknownPartition = -190,
    /// Topic is not known.
    LocalUnknownTopic = -188,
    /// Invalid argument or configuration.
    LocalInvalidArg = -186,
    /// Operation timed out.
    LocalTimedOut = -185,
    /// Operation is not valid in the current state.
    LocalState = -172,
    /// No offset to commit.
    LocalNoOffset = -168,
    /// Key could not be deserialized.
    LocalKeyDeserialization = -160,
    /// Value could not be deserialized.
    LocalValueDeserialization = -159,
    /// Fatal error, the client instance is unusable.
    LocalFatal = -150,
    /// The server experienced an unexpected error when processing the request.
    Unknown = -1,
    None = 0,
    /// The requested offset is not within the range of offsets maintained by the server.
    OffsetOutOfRange = 1,
    /// This message has failed its CRC checksum, exceeds the valid size, has a null key for a compacted topic, or is otherwise corrupt.
    CorruptMessage = 2,
    /// This server does not host this topic-partition.
    UnknownTopicOrPartition = 3,
    /// The requested fetch size is invalid.
    InvalidFetchSize = 4,
    /// There is no leader for this topic-partition as we are in the middle of a leadership election.
    LeaderNotAvailable = 5,
    /// This server is not the leader for that topic-partition.
    NotLeaderForPartition = 6,
    /// The request timed out.
    RequestTimedOut = 7,
    /// The broker is not available.
    BrokerNotAvailable = 8,
    /// The replica is not available for the requested topic-partition.
    ReplicaNotAvailable = 9,
    /// The request included a message larger than the max message size the server will accept.
    MessageSizeTooLarge = 10,
    /// The controller moved to another broker.
    StaleControllerEpoch = 11,
    /// The metadata field of the offset request was too large.
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The coordinator is loading and hence can't process requests.
    CoordinatorLoadInProgress = 14,
    /// The coordinator is not available.
    CoordinatorNotAvailable = 15,
    /// This is not the correct coordinator.
    NotCoordinator = 16,
    /// The request attempted to perform an operation on an invalid topic.
    InvalidTopicException = 17,
    /// The request included message batch larger than the configured segment size on the server.
    RecordListTooLarge = 18,
    /// Messages are rejected since there are fewer in-sync replicas than required.
    NotEnoughReplicas = 19,
    /// Messages are written to the log, but to fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Produce request specified an invalid value for required acks.
    InvalidRequiredAcks = 21,
    /// Specified group generation id is not valid.
    IllegalGeneration = 22,
    /// The group member's supported protocols are incompatible with those of existing members.
    InconsistentGroupProtocol = 23,
    /// The configured groupId is invalid.
    InvalidGroupId = 24,
    /// The coordinator is not aware of this member.
    UnknownMemberId = 25,
    /// The session timeout is not within the range allowed by the broker.
    InvalidSessionTimeout = 26,
    /// The group is rebalancing, so a rejoin is needed.
    RebalanceInProgress = 27,
    /// The committing offset data size is not valid.
    InvalidCommitOffsetSize = 28,
    /// Topic authorization failed.
    TopicAuthorizationFailed = 29,
    /// Group authorization failed.
    GroupAuthorizationFailed = 30,
    /// Cluster authorization failed.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
}

impl KafkaCode {
    /// Decode a raw code, mapping anything unrecognised to [`KafkaCode::Unknown`].
    pub fn from_raw(code: i16) -> Self {
        FromPrimitive::from_i16(code).unwrap_or(KafkaCode::Unknown)
    }

    pub fn is_local(&self) -> bool {
        (*self as i16) < -1
    }
}

impl fmt::Display for KafkaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i16)
    }
}
