//! # Josef
//! The consumer half of a Kafka client.
//!
//! This crate drives a broker transport on behalf of an application: it
//! polls the transport's event queue, decodes records into typed keys and
//! values, tracks assignments and offsets client side, and routes
//! rebalances, commit results, errors, statistics and logs to
//! application callbacks.
//!
//! The transport itself sits behind the [`Transport`](prelude::transport::Transport)
//! trait. An in-memory cluster, [`mock::MockCluster`], implements it for
//! tests and local development.
//!
//! ## Table of contents
//! - [Getting started](#getting-started)
//!     - [Consumer](#consumer)
//!     - [Consumer group](#consumer-group)
//!     - [Offsets](#offsets)
//! - [Resources](#resources)
//!
//! ## Getting started
//! Include the following snippet in your `Cargo.toml` dependencies:
//! ```toml
//! josef = "0.1"
//! ```
//!
//! ### Consumer
//! A [`Consumer`](prelude::Consumer) is built from a string keyed
//! [`ClientConfig`](prelude::ClientConfig) with a
//! [`ConsumerBuilder`](prelude::ConsumerBuilder). Keys and values each need
//! a decoder: a [`Deserializer`](prelude::Deserializer), or one of the
//! `Null` / `Ignore` markers of [`Decoder`](prelude::Decoder).
//!
//! Partitions can be assigned explicitly:
//! ```rust
//! use std::time::Duration;
//! use josef::prelude::*;
//! use josef::mock::{MockCluster, MockRecord};
//!
//! let cluster = MockCluster::new();
//! cluster.create_topic("my-topic", 1).unwrap();
//! cluster
//!     .produce("my-topic", 0, MockRecord::new().key("id").value("Value"))
//!     .unwrap();
//!
//! let config: ClientConfig = [("group.id", "my-group")].into_iter().collect();
//! let mut consumer = ConsumerBuilder::new(config)
//!     .key_deserializer(StringDeserializer::new())
//!     .value_deserializer(BytesDeserializer)
//!     .build(&cluster)
//!     .unwrap();
//!
//! consumer
//!     .assign(&[TopicPartitionOffset::new("my-topic", 0, Offset::BEGINNING)])
//!     .unwrap();
//! let result = consumer.consume(Duration::from_secs(1)).unwrap();
//! assert_eq!(result.key(), Some(&Some("id".to_owned())));
//! ```
//!
//! ### Consumer group
//! With [`subscribe`](prelude::Consumer::subscribe) the group coordinator
//! hands out partitions instead. Assignments and revocations arrive during
//! [`consume`](prelude::Consumer::consume) and are applied directly, unless
//! a handler was registered to take over:
//! ```rust
//! use josef::prelude::*;
//! use josef::mock::MockCluster;
//!
//! let cluster = MockCluster::new();
//! let config: ClientConfig = [("group.id", "my-group")].into_iter().collect();
//! let consumer = ConsumerBuilder::new(config)
//!     .key_decoder(Decoder::<()>::Ignore)
//!     .value_deserializer(StringDeserializer::new())
//!     .on_partitions_assigned(|membership, partitions| {
//!         let from_start: Vec<TopicPartitionOffset> = partitions
//!             .iter()
//!             .map(|tp| tp.with_offset(Offset::BEGINNING))
//!             .collect();
//!         membership.assign(&from_start).unwrap();
//!     })
//!     .build(&cluster)
//!     .unwrap();
//! ```
//!
//! ### Offsets
//! Each delivered record moves its partition's position. With
//! `enable.auto.offset.store` (the default) it is also stored, and stored
//! offsets are committed every `auto.commit.interval.ms` while consuming.
//! Turn auto store off to store only what was processed with
//! [`store_offset`](prelude::Consumer::store_offset), or commit explicitly
//! with [`commit_async`](prelude::Consumer::commit_async).
//!
//! ## Resources
//! - [Kafka protocol guide](https://kafka.apache.org/protocol)
//! - [Consumer configuration](https://kafka.apache.org/documentation/#consumerconfigs)

mod assignor;
mod config;
mod consumer;
mod consumer_builder;
mod deserializer;
mod error;
mod membership;
mod message;
pub mod mock;
mod observers;
mod offset;
mod offsets;
mod topic_partition;
mod transport;
mod utils;

const DEFAULT_CLIENT_ID: &str = "josef";

pub use offset::Offset;

pub mod prelude {
    //! Main export of various structures and methods
    //!
    //! # Consuming
    //! [`Consumer`] and [`ConsumerBuilder`] are the entry points. Results come
    //! back as [`ConsumeResult`] values; records that could not be delivered
    //! come back as [`Error::Consume`] carrying the raw bytes.
    //!
    //! # Decoding
    //! The built in deserializers cover text ([`StringDeserializer`]), raw
    //! bytes ([`BytesDeserializer`]), big-endian numbers and JSON. Any
    //! `Fn(&str, &[u8], bool)` closure works as well.
    //!
    //! # Transports
    //! The [`transport`] module has what is needed to plug in a transport
    //! other than [`crate::mock::MockCluster`].
    pub use crate::assignor::{RANGE_PROTOCOL, ROUND_ROBIN_PROTOCOL};
    pub use crate::config::{property_names, ClientConfig, ConsumeResultFields, ConsumerConfig};
    pub use crate::consumer::Consumer;
    pub use crate::consumer_builder::ConsumerBuilder;
    pub use crate::deserializer::{
        BytesDeserializer, Decoder, DeserializeError, Deserializer, DoubleDeserializer,
        Encoding, FloatDeserializer, IntDeserializer, JsonDeserializer, LongDeserializer,
        StringDeserializer,
    };
    pub use crate::error::{ConsumeError, Error, KafkaCode, KafkaError, RawMessage, Result};
    pub use crate::membership::Membership;
    pub use crate::message::{
        CommittedOffsets, ConsumeResult, Header, Headers, LogMessage, Message, Payload,
        SyslogLevel, Timestamp, TimestampType,
    };
    pub use crate::observers::{
        CommittedHandler, ErrorHandler, LogHandler, PartitionsHandler, StatisticsHandler,
    };
    pub use crate::offset::Offset;
    pub use crate::topic_partition::{
        TopicPartition, TopicPartitionError, TopicPartitionOffset, TopicPartitionOffsetError,
        TopicPartitionTimestamp,
    };

    pub use bytes;
    pub use tokio_util::sync::CancellationToken;

    pub mod transport {
        pub use crate::transport::*;
    }
}
