//! Records handed to the application and the events that travel with them.

use bytes::Bytes;

use crate::{
    error::{KafkaCode, KafkaError},
    offset::Offset,
    topic_partition::{TopicPartition, TopicPartitionOffset, TopicPartitionOffsetError},
};

/// How a record's timestamp was assigned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TimestampType {
    #[default]
    NotAvailable,
    CreateTime,
    LogAppendTime,
}

/// Milliseconds since the unix epoch plus the kind of timestamp.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    pub unix_timestamp_ms: i64,
    pub kind: TimestampType,
}

impl Timestamp {
    pub fn new(unix_timestamp_ms: i64, kind: TimestampType) -> Self {
        Self {
            unix_timestamp_ms,
            kind,
        }
    }

    pub fn not_available() -> Self {
        Self::default()
    }
}

/// A single header: a name and an opaque byte value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    key: String,
    value: Bytes,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Ordered record headers.
///
/// Duplicate names are allowed and keep their insertion order. Lookups by
/// name return the last matching entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    headers: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.headers.push(Header::new(key, value));
    }

    /// The value of the last header named `key`.
    pub fn last(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .rev()
            .find(|header| header.key == key)
            .map(Header::value)
    }

    /// Drop every header named `key`.
    pub fn remove(&mut self, key: &str) {
        self.headers.retain(|header| header.key != key);
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.headers.iter()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self {
            headers: iter.into_iter().collect(),
        }
    }
}

/// The decoded form of a key or a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    /// Output of a typed deserializer.
    Value(T),
    /// Produced by the null marker decoder.
    Null,
    /// Produced by the ignore marker decoder.
    Ignored,
}

impl<T> Payload<T> {
    pub fn as_value(&self) -> Option<&T> {
        match self {
            Payload::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Payload::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Payload::Ignored)
    }
}

/// Timestamp, headers, key and value of a record.
///
/// Headers are `None` when header marshaling is switched off.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<K, V> {
    pub(crate) timestamp: Timestamp,
    pub(crate) headers: Option<Headers>,
    pub(crate) key: K,
    pub(crate) value: V,
}

impl<K, V> Message<K, V> {
    pub(crate) fn new(timestamp: Timestamp, headers: Option<Headers>, key: K, value: V) -> Self {
        Self {
            timestamp,
            headers,
            key,
            value,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_parts(self) -> (Timestamp, Option<Headers>, K, V) {
        (self.timestamp, self.headers, self.key, self.value)
    }
}

/// What a single consume call produced.
///
/// A delivered record has a message and no error. A partition EOF marker or
/// a timed out poll carry only the position and the corresponding code.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeResult<K, V> {
    pub(crate) topic_partition_offset_error: TopicPartitionOffsetError,
    pub(crate) message: Option<Message<Payload<K>, Payload<V>>>,
}

impl<K, V> ConsumeResult<K, V> {
    pub(crate) fn timed_out() -> Self {
        Self {
            topic_partition_offset_error: TopicPartitionOffsetError {
                topic: String::new(),
                partition: -1,
                offset: Offset::INVALID,
                error: KafkaError::new(KafkaCode::LocalTimedOut),
            },
            message: None,
        }
    }

    pub(crate) fn partition_eof(topic_partition_offset: &TopicPartitionOffset) -> Self {
        Self {
            topic_partition_offset_error: TopicPartitionOffsetError::new(
                topic_partition_offset,
                KafkaError::new(KafkaCode::LocalPartitionEof),
            ),
            message: None,
        }
    }

    pub(crate) fn record(
        topic_partition_offset: &TopicPartitionOffset,
        message: Message<Payload<K>, Payload<V>>,
    ) -> Self {
        Self {
            topic_partition_offset_error: TopicPartitionOffsetError::new(
                topic_partition_offset,
                KafkaError::no_error(),
            ),
            message: Some(message),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic_partition_offset_error.topic
    }

    pub fn partition(&self) -> i32 {
        self.topic_partition_offset_error.partition
    }

    pub fn offset(&self) -> Offset {
        self.topic_partition_offset_error.offset
    }

    pub fn error(&self) -> &KafkaError {
        &self.topic_partition_offset_error.error
    }

    pub fn topic_partition(&self) -> TopicPartition {
        self.topic_partition_offset_error.topic_partition()
    }

    pub fn topic_partition_offset(&self) -> TopicPartitionOffset {
        self.topic_partition_offset_error.topic_partition_offset()
    }

    pub fn topic_partition_offset_error(&self) -> &TopicPartitionOffsetError {
        &self.topic_partition_offset_error
    }

    pub fn is_partition_eof(&self) -> bool {
        self.error().code() == KafkaCode::LocalPartitionEof
    }

    pub fn is_timed_out(&self) -> bool {
        self.error().code() == KafkaCode::LocalTimedOut
    }

    pub fn message(&self) -> Option<&Message<Payload<K>, Payload<V>>> {
        self.message.as_ref()
    }

    pub fn into_message(self) -> Option<Message<Payload<K>, Payload<V>>> {
        self.message
    }

    /// The typed key, if a record was delivered and decoded into a value.
    pub fn key(&self) -> Option<&K> {
        self.message.as_ref().and_then(|message| message.key.as_value())
    }

    /// The typed value, if a record was delivered and decoded into a value.
    pub fn value(&self) -> Option<&V> {
        self.message
            .as_ref()
            .and_then(|message| message.value.as_value())
    }

    pub fn headers(&self) -> Option<&Headers> {
        self.message.as_ref().and_then(|message| message.headers())
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.message.as_ref().map(|message| message.timestamp)
    }
}

/// Outcome of an automatic or explicit commit, as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedOffsets {
    pub offsets: Vec<TopicPartitionOffsetError>,
    pub error: KafkaError,
}

/// Syslog style severity of a transport log line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyslogLevel {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

/// A log line emitted by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    /// Name of the client instance that logged the line.
    pub name: String,
    pub level: SyslogLevel,
    pub facility: String,
    pub message: String,
}
