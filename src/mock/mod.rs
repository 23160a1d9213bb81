//! An in-process cluster for tests and local development.
//!
//! [`MockCluster`] keeps partition logs, group membership and committed
//! offsets in memory and hands out [`MockTransport`] handles through
//! [`Connect`]. Group members are assigned partitions with the same
//! assignors a real coordinator would use, and every membership change
//! revokes and reassigns partitions through the members' event queues.
//!
//! ```rust
//! use josef::mock::{MockCluster, MockRecord};
//!
//! let cluster = MockCluster::new();
//! cluster.create_topic("purchases", 3).unwrap();
//! cluster
//!     .produce("purchases", 0, MockRecord::new().key("k").value("v"))
//!     .unwrap();
//! ```

mod state;
mod transport;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;

use crate::{
    assignor,
    config::{property_names as names, ClientConfig},
    error::{Error, KafkaError, Result},
    message::{Headers, Timestamp, TimestampType},
    offset::Offset,
    topic_partition::TopicPartition,
    transport::{Connect, Transport},
    utils,
};
use state::{Handle, ResetPolicy, Shared, StoredRecord};
pub use transport::MockTransport;

pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";
pub const PARTITION_ASSIGNMENT_STRATEGY: &str = "partition.assignment.strategy";
pub const DEBUG: &str = "debug";

/// Properties a mock transport accepts. Anything else is rejected the way
/// a real client rejects unknown properties.
const KNOWN_PROPERTIES: [&str; 12] = [
    BOOTSTRAP_SERVERS,
    PARTITION_ASSIGNMENT_STRATEGY,
    DEBUG,
    names::GROUP_ID,
    names::CLIENT_ID,
    names::ENABLE_AUTO_COMMIT,
    names::AUTO_COMMIT_INTERVAL_MS,
    names::ENABLE_AUTO_OFFSET_STORE,
    names::AUTO_OFFSET_RESET,
    names::ENABLE_PARTITION_EOF,
    names::SESSION_TIMEOUT_MS,
    names::STATISTICS_INTERVAL_MS,
];

const DEFAULT_SESSION_TIMEOUT_MS: u64 = 45_000;

/// A record to append to a mock partition.
#[derive(Debug, Clone, Default)]
pub struct MockRecord {
    key: Option<Bytes>,
    value: Option<Bytes>,
    headers: Headers,
    timestamp: Option<Timestamp>,
}

impl MockRecord {
    /// A record with a null key, a null value and no headers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.add(key, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Defaults to the append time, as a create timestamp.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Topics, partition logs and consumer groups held in memory.
///
/// Clones share the same cluster.
#[derive(Debug, Clone, Default)]
pub struct MockCluster {
    shared: Arc<Shared>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(&self, name: &str, partitions: i32) -> Result<()> {
        self.shared.lock().create_topic(name, partitions)?;
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Append a record and return its offset.
    pub fn produce(&self, topic: &str, partition: i32, record: MockRecord) -> Result<Offset> {
        let stored = StoredRecord {
            timestamp: record
                .timestamp
                .unwrap_or_else(|| Timestamp::new(utils::now(), TimestampType::CreateTime)),
            headers: record.headers,
            key: record.key,
            value: record.value,
            error: KafkaError::no_error(),
        };
        let offset = self
            .shared
            .lock()
            .append(&TopicPartition::new(topic, partition), stored)?;
        self.shared.changed.notify_all();
        Ok(offset)
    }

    /// Make the record at `offset` fail its checksum when fetched.
    pub fn corrupt_record(&self, topic_partition: &TopicPartition, offset: Offset) -> Result<()> {
        self.shared.lock().corrupt(topic_partition, offset)
    }

    /// Fail every fetch, commit and offset query on `topic`.
    pub fn deny_topic(&self, topic: &str) {
        self.shared.lock().denied_topics.insert(topic.to_owned());
    }

    pub fn allow_topic(&self, topic: &str) {
        self.shared.lock().denied_topics.remove(topic);
    }

    /// Queue an error event on every connected client.
    pub fn inject_error(&self, error: KafkaError) {
        self.shared.lock().broadcast(&error);
        self.shared.changed.notify_all();
    }

    pub fn committed_offset(&self, group_id: &str, topic_partition: &TopicPartition) -> Option<Offset> {
        self.shared
            .lock()
            .groups
            .get(group_id)
            .and_then(|group| group.committed.get(topic_partition).copied())
    }

    /// Member ids of a group, in join order.
    pub fn group_members(&self, group_id: &str) -> Vec<String> {
        let mut state = self.shared.lock();
        if state.expire_sessions() {
            self.shared.changed.notify_all();
        }
        let Some(group) = state.groups.get(group_id) else {
            return vec![];
        };
        group
            .members
            .iter()
            .filter_map(|id| state.handles.get(id)?.member_id.clone())
            .collect()
    }

    pub fn group_generation(&self, group_id: &str) -> Option<i32> {
        self.shared
            .lock()
            .groups
            .get(group_id)
            .map(|group| group.generation)
    }

    pub fn high_watermark(&self, topic_partition: &TopicPartition) -> Option<Offset> {
        self.shared.lock().high_watermark(topic_partition)
    }
}

impl Connect for MockCluster {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn Transport>> {
        for (key, _) in config {
            if !KNOWN_PROPERTIES.contains(&key.as_str()) {
                return Err(Error::Config(format!(
                    "No such configuration property: \"{}\"",
                    key
                )));
            }
        }

        let group_id = config
            .get(names::GROUP_ID)
            .ok_or_else(|| Error::Config(format!("'{}' is required", names::GROUP_ID)))?
            .to_owned();
        let client_id = config
            .get(names::CLIENT_ID)
            .unwrap_or(crate::DEFAULT_CLIENT_ID)
            .to_owned();
        let reset = match config.get(names::AUTO_OFFSET_RESET).unwrap_or("latest") {
            "earliest" | "smallest" | "beginning" => ResetPolicy::Earliest,
            "latest" | "largest" | "end" => ResetPolicy::Latest,
            "error" => ResetPolicy::Error,
            other => {
                return Err(Error::Config(format!(
                    "invalid value '{}' for '{}'",
                    other,
                    names::AUTO_OFFSET_RESET
                )))
            }
        };
        let strategy = config
            .get(PARTITION_ASSIGNMENT_STRATEGY)
            .unwrap_or(assignor::ROUND_ROBIN_PROTOCOL)
            .to_owned();
        if strategy != assignor::ROUND_ROBIN_PROTOCOL && strategy != assignor::RANGE_PROTOCOL {
            return Err(Error::Config(format!(
                "assignment strategy '{}' is not supported",
                strategy
            )));
        }
        let session_timeout = Duration::from_millis(
            config.get_u64(names::SESSION_TIMEOUT_MS, DEFAULT_SESSION_TIMEOUT_MS)?,
        );
        let statistics_interval = match config.get_u64(names::STATISTICS_INTERVAL_MS, 0)? {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let partition_eof = config.get_bool(names::ENABLE_PARTITION_EOF, false)?;

        let mut state = self.shared.lock();
        state.next_handle += 1;
        let id = state.next_handle;
        let name = format!("{}#consumer-{}", client_id, id);
        tracing::debug!("Connecting {} to the mock cluster", name);

        state.handles.insert(
            id,
            Handle {
                name: name.clone(),
                client_id,
                group_id,
                strategy,
                member_id: None,
                subscription: vec![],
                owned: vec![],
                fetches: vec![],
                cursor: 0,
                events: Default::default(),
                reset,
                partition_eof,
                session_timeout,
                statistics_interval,
                last_statistics: Instant::now(),
                alive: true,
                last_seen: Instant::now(),
                closed: false,
            },
        );

        Ok(Arc::new(MockTransport {
            id,
            name,
            shared: self.shared.clone(),
        }))
    }
}
