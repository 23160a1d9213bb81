//! Consume records from a group or from explicitly assigned partitions.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use josef::prelude::*;
//! use josef::mock::{MockCluster, MockRecord};
//!
//! let cluster = MockCluster::new();
//! cluster.create_topic("purchases", 1).unwrap();
//! cluster
//!     .produce("purchases", 0, MockRecord::new().value("hello"))
//!     .unwrap();
//!
//! let config: ClientConfig = [("group.id", "billing"), ("auto.offset.reset", "earliest")]
//!     .into_iter()
//!     .collect();
//! let mut consumer = ConsumerBuilder::new(config)
//!     .key_decoder(Decoder::<()>::Ignore)
//!     .value_deserializer(StringDeserializer::new())
//!     .build(&cluster)
//!     .unwrap();
//!
//! consumer.subscribe(&["purchases".to_owned()]).unwrap();
//! let result = consumer.consume(Duration::from_secs(1)).unwrap();
//! assert_eq!(result.value(), Some(&Some("hello".to_owned())));
//! consumer.close().unwrap();
//! ```

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    config::ConsumerConfig,
    deserializer::Decoder,
    error::{ConsumeError, Error, KafkaCode, KafkaError, RawMessage, Result},
    membership::Membership,
    message::{CommittedOffsets, ConsumeResult, LogMessage, Message, Timestamp},
    observers::Observers,
    offsets::{align_outcomes, into_offsets, OffsetTracker},
    topic_partition::{
        dedup_by_partition, TopicPartition, TopicPartitionOffset, TopicPartitionOffsetError,
        TopicPartitionTimestamp,
    },
    transport::{Event, Record, Transport},
    utils,
};

/// How often a cancellable consume checks its token.
const CANCELLATION_QUANTUM: Duration = Duration::from_millis(100);
/// Pause between transport polls of the async consume variants.
const ASYNC_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Poll timeout used by [`Consumer::into_stream`].
const STREAM_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// A consumer of records keyed by `K` with values of type `V`.
///
/// Every call that takes `&mut self` is single-threaded with respect to the
/// consumer: observers fire on the caller's thread, inside
/// [`Consumer::consume`]. Offset queries and commits hand their work to a
/// blocking worker and can run alongside consumption.
pub struct Consumer<K, V> {
    pub(crate) config: ConsumerConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) key_decoder: Decoder<K>,
    pub(crate) value_decoder: Decoder<V>,
    pub(crate) membership: Membership,
    pub(crate) offsets: OffsetTracker,
    pub(crate) observers: Observers,
    /// Assignment epoch the offset tracker was last synced to.
    pub(crate) synced_epoch: u64,
    pub(crate) closed: bool,
}

impl<K, V> std::fmt::Debug for Consumer<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("key_decoder", &self.key_decoder)
            .field("value_decoder", &self.value_decoder)
            .field("observers", &self.observers)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<K, V> Consumer<K, V> {
    pub(crate) fn new(
        config: ConsumerConfig,
        transport: Arc<dyn Transport>,
        key_decoder: Decoder<K>,
        value_decoder: Decoder<V>,
        observers: Observers,
    ) -> Self {
        let auto_commit_interval = config
            .enable_auto_commit
            .then_some(config.auto_commit_interval);
        Self {
            offsets: OffsetTracker::new(config.enable_auto_offset_store, auto_commit_interval),
            membership: Membership::new(transport.clone()),
            config,
            transport,
            key_decoder,
            value_decoder,
            observers,
            synced_epoch: 0,
            closed: false,
        }
    }

    /// Name of the underlying client instance.
    pub fn name(&self) -> String {
        self.transport.name()
    }

    pub fn member_id(&self) -> String {
        self.membership.member_id()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("consumer is closed".to_owned()));
        }
        Ok(())
    }

    /// Wait up to `timeout` for the next record or partition EOF marker.
    ///
    /// Rebalances, commit acknowledgements, errors, statistics and logs
    /// met on the way are dispatched to their observers. When nothing
    /// arrives in time the result is a timed out marker, not an error.
    pub fn consume(&mut self, timeout: Duration) -> Result<ConsumeResult<K, V>> {
        self.ensure_open()?;
        let deadline = utils::deadline(timeout);

        loop {
            self.auto_commit();
            let Some(event) = self.transport.poll(utils::remaining(deadline)) else {
                return Ok(ConsumeResult::timed_out());
            };
            if let Some(result) = self.handle_event(event)? {
                return Ok(result);
            }
        }
    }

    /// Block until a record or EOF marker arrives or `cancel` fires.
    ///
    /// Cancellation is observed within [`CANCELLATION_QUANTUM`] and ends in
    /// [`Error::Cancelled`].
    pub fn consume_until_cancelled(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ConsumeResult<K, V>> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let result = self.consume(CANCELLATION_QUANTUM)?;
            if !result.is_timed_out() {
                return Ok(result);
            }
        }
    }

    /// Like [`Consumer::consume`], but yields to the runtime while waiting.
    ///
    /// The consumer stays borrowed for the whole call, so the transport is
    /// polled on the calling task: a zero timeout poll every
    /// [`ASYNC_POLL_INTERVAL`] until a result arrives or `timeout` passes.
    pub async fn consume_async(&mut self, timeout: Duration) -> Result<ConsumeResult<K, V>> {
        let deadline = utils::deadline(timeout);
        loop {
            let result = self.consume(Duration::ZERO)?;
            let left = utils::remaining(deadline);
            if !result.is_timed_out() || left.is_zero() {
                return Ok(result);
            }
            tokio::time::sleep(left.min(ASYNC_POLL_INTERVAL)).await;
        }
    }

    /// Like [`Consumer::consume_until_cancelled`], but yields to the runtime
    /// while waiting. Polls the same way as [`Consumer::consume_async`].
    pub async fn consume_async_until_cancelled(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ConsumeResult<K, V>> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let result = self.consume(Duration::ZERO)?;
            if !result.is_timed_out() {
                return Ok(result);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(ASYNC_POLL_INTERVAL) => {}
            }
        }
    }

    /// Convert consumer into an asynchronous iterator.
    ///
    /// Timed out polls are skipped; records, EOF markers and errors are
    /// yielded as they come.
    #[must_use = "stream does nothing by itself"]
    pub fn into_stream(mut self) -> impl Stream<Item = Result<ConsumeResult<K, V>>> {
        async_stream::stream! {
            loop {
                match self.consume_async(STREAM_POLL_TIMEOUT).await {
                    Ok(result) if result.is_timed_out() => continue,
                    other => yield other,
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<Option<ConsumeResult<K, V>>> {
        match event {
            Event::Record(record) => self.deliver(record),
            Event::PartitionEof(position) => {
                let topic_partition = position.topic_partition();
                if !self.membership.is_assigned(&topic_partition) {
                    return Ok(None);
                }
                self.offsets.on_eof(topic_partition, position.offset);
                let position = if self.config.consume_result_fields.topic {
                    position
                } else {
                    TopicPartitionOffset::new(String::new(), position.partition, position.offset)
                };
                Ok(Some(ConsumeResult::partition_eof(&position)))
            }
            Event::Rebalance(rebalance) => {
                self.observers.rebalance(&mut self.membership, &rebalance);
                self.sync_assignment();
                Ok(None)
            }
            Event::OffsetsCommitted(committed) => {
                self.offsets.on_committed(&committed);
                self.observers.committed(&committed);
                Ok(None)
            }
            Event::Error(error) => {
                self.observers.error(&error);
                if error.code() == KafkaCode::LocalFatal {
                    return Err(error.into());
                }
                Ok(None)
            }
            Event::Statistics(statistics) => {
                self.observers.statistics(&statistics);
                Ok(None)
            }
            Event::Log(log) => {
                self.observers.log(&log);
                Ok(None)
            }
        }
    }

    /// Decode a fetched record into a result, or into a consume error that
    /// carries the raw record.
    fn deliver(&mut self, record: Record) -> Result<Option<ConsumeResult<K, V>>> {
        let topic_partition = TopicPartition::new(record.topic.clone(), record.partition);
        if !self.membership.is_assigned(&topic_partition) {
            tracing::debug!(
                "Dropping record {} from unassigned {}",
                record.offset,
                topic_partition
            );
            return Ok(None);
        }

        let fields = self.config.consume_result_fields;
        let topic = if fields.topic {
            record.topic
        } else {
            String::new()
        };
        let position = TopicPartitionOffset::new(topic, record.partition, record.offset);
        let timestamp = if fields.timestamp {
            record.timestamp
        } else {
            Timestamp::not_available()
        };
        let headers = fields.headers.then_some(record.headers);

        if record.error.is_error() {
            self.offsets.on_undelivered(topic_partition, record.offset);
            let raw = Message::new(timestamp, headers, record.key, record.value);
            return Err(undelivered(&position, record.error, raw));
        }

        let key = match self
            .key_decoder
            .decode(&position.topic, record.key.as_deref())
        {
            Ok(key) => key,
            Err(err) => {
                self.offsets.on_undelivered(topic_partition, record.offset);
                let error = KafkaError::with_reason(KafkaCode::LocalKeyDeserialization, err.message());
                let raw = Message::new(timestamp, headers, record.key, record.value);
                return Err(undelivered(&position, error, raw));
            }
        };
        let value = match self
            .value_decoder
            .decode(&position.topic, record.value.as_deref())
        {
            Ok(value) => value,
            Err(err) => {
                self.offsets.on_undelivered(topic_partition, record.offset);
                let error =
                    KafkaError::with_reason(KafkaCode::LocalValueDeserialization, err.message());
                let raw = Message::new(timestamp, headers, record.key, record.value);
                return Err(undelivered(&position, error, raw));
            }
        };

        self.offsets.on_delivered(topic_partition, record.offset);
        Ok(Some(ConsumeResult::record(
            &position,
            Message::new(timestamp, headers, key, value),
        )))
    }

    /// Send stored offsets if the auto-commit timer fired.
    fn auto_commit(&mut self) {
        if let Some(offsets) = self.offsets.due_auto_commit(&self.membership) {
            tracing::debug!("Auto committing {} offsets", offsets.len());
            self.transport.commit_queued(offsets);
        }
    }

    /// Reset offset bookkeeping after the assignment changed. With
    /// auto-commit on, stored offsets of revoked partitions are committed
    /// first so the next owner resumes after them.
    fn sync_assignment(&mut self) {
        if self.membership.epoch() != self.synced_epoch {
            let revoked = self.offsets.pending_revoked(self.membership.assigned_offsets());
            if !revoked.is_empty() {
                tracing::debug!("Committing {} offsets of revoked partitions", revoked.len());
                self.transport.commit_queued(revoked);
            }
            self.offsets.on_assign(self.membership.assigned_offsets());
            self.synced_epoch = self.membership.epoch();
        }
    }

    // membership

    /// Join the group and ask for partitions of `topics`.
    ///
    /// Replaces any previous subscription. Partitions arrive through a
    /// rebalance during a later consume call.
    pub fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        self.ensure_open()?;
        self.membership.subscribe(topics)
    }

    pub fn unsubscribe(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.membership.unsubscribe()
    }

    pub fn subscription(&self) -> Vec<String> {
        self.membership.subscription()
    }

    /// Replace the assignment with exactly `partitions`.
    pub fn assign(&mut self, partitions: &[TopicPartitionOffset]) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.membership.assign(partitions);
        self.sync_assignment();
        outcome
    }

    /// Replace the assignment, resuming each partition from its committed offset.
    pub fn assign_partitions(&mut self, partitions: &[TopicPartition]) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.membership.assign_partitions(partitions);
        self.sync_assignment();
        outcome
    }

    pub fn unassign(&mut self) -> Result<()> {
        self.ensure_open()?;
        let outcome = self.membership.unassign();
        self.sync_assignment();
        outcome
    }

    pub fn assignment(&self) -> Vec<TopicPartition> {
        self.membership.assignment()
    }

    pub fn pause(&mut self, partitions: &[TopicPartition]) -> Result<()> {
        self.membership.pause(partitions)
    }

    pub fn resume(&mut self, partitions: &[TopicPartition]) -> Result<()> {
        self.membership.resume(partitions)
    }

    // observers

    /// Take over applying assignments. The handler should call
    /// [`Membership::assign`] with the partitions, possibly with offsets.
    pub fn on_partitions_assigned(
        &mut self,
        handler: impl FnMut(&mut Membership, &[TopicPartition]) + Send + 'static,
    ) {
        self.observers.assigned.push(Box::new(handler));
    }

    /// Take over applying revocations. The handler should call
    /// [`Membership::unassign`].
    pub fn on_partitions_revoked(
        &mut self,
        handler: impl FnMut(&mut Membership, &[TopicPartition]) + Send + 'static,
    ) {
        self.observers.revoked.push(Box::new(handler));
    }

    pub fn on_offsets_committed(&mut self, handler: impl FnMut(&CommittedOffsets) + Send + 'static) {
        self.observers.committed.push(Box::new(handler));
    }

    pub fn on_error(&mut self, handler: impl FnMut(&KafkaError) + Send + 'static) {
        self.observers.error.push(Box::new(handler));
    }

    pub fn on_statistics(&mut self, handler: impl FnMut(&str) + Send + 'static) {
        self.observers.statistics.push(Box::new(handler));
    }

    pub fn on_log(&mut self, handler: impl FnMut(&LogMessage) + Send + 'static) {
        self.observers.log.push(Box::new(handler));
    }

    // offsets

    /// Move the fetch position of an assigned partition.
    #[instrument(level = "debug", skip(self))]
    pub fn seek(&mut self, position: &TopicPartitionOffset) -> Result<()> {
        self.ensure_open()?;
        let topic_partition = position.topic_partition();
        if !self.membership.is_assigned(&topic_partition) {
            return Err(Error::InvalidState(format!(
                "cannot seek {}, it is not assigned",
                topic_partition
            )));
        }
        self.transport.seek(position)?;
        self.offsets.on_seek(topic_partition, position.offset);
        Ok(())
    }

    /// Offsets of the next records the application will receive.
    pub fn position(&self, partitions: &[TopicPartition]) -> Result<Vec<TopicPartitionOffset>> {
        self.offsets.positions(&self.membership, partitions)
    }

    /// Mark the record in `result` as processed.
    ///
    /// Its offset plus one is committed by the next auto or explicit commit.
    /// Only valid with `enable.auto.offset.store=false`.
    pub fn store_offset(&mut self, result: &ConsumeResult<K, V>) -> Result<()> {
        let position = next_position(result)?;
        self.offsets.store(&self.membership, &[position])
    }

    /// Store the given next offsets to commit.
    pub fn store_offsets(&mut self, offsets: &[TopicPartitionOffset]) -> Result<()> {
        self.offsets.store(&self.membership, offsets)
    }

    /// Commit the stored offsets of all assigned partitions.
    pub fn commit_async(&self) -> impl Future<Output = Result<Vec<TopicPartitionOffset>>> + Send {
        let offsets = self.offsets.stored(&self.membership);
        let transport = self.transport.clone();
        let closed = self.ensure_open();
        async move {
            closed?;
            if offsets.is_empty() {
                return Err(KafkaError::with_reason(
                    KafkaCode::LocalNoOffset,
                    "no stored offsets to commit",
                )
                .into());
            }
            commit_offsets(transport, offsets).await
        }
    }

    /// Commit exactly `offsets`. Each offset is the next one to consume.
    pub fn commit_offsets_async(
        &self,
        offsets: Vec<TopicPartitionOffset>,
    ) -> impl Future<Output = Result<Vec<TopicPartitionOffset>>> + Send {
        let transport = self.transport.clone();
        let closed = self.ensure_open();
        async move {
            closed?;
            if offsets.is_empty() {
                return Err(KafkaError::new(KafkaCode::LocalNoOffset).into());
            }
            commit_offsets(transport, offsets).await
        }
    }

    /// Commit the position after the record in `result`.
    ///
    /// Results that carry an error code, partition EOF included, are
    /// rejected before anything is sent.
    pub fn commit_result_async(
        &self,
        result: &ConsumeResult<K, V>,
    ) -> impl Future<Output = Result<TopicPartitionOffset>> + Send {
        let request = self.ensure_open().and_then(|_| next_position(result));
        let transport = self.transport.clone();
        async move {
            let position = request?;
            commit_offsets(transport, vec![position])
                .await?
                .pop()
                .ok_or_else(|| Error::Kafka(KafkaError::new(KafkaCode::LocalBadMsg)))
        }
    }

    /// Offsets last committed for the group.
    ///
    /// Partitions with nothing committed report [`crate::Offset::INVALID`].
    pub fn committed_async(
        &self,
        partitions: &[TopicPartition],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<TopicPartitionOffset>>> + Send {
        let request = dedup_by_partition(partitions);
        let transport = self.transport.clone();
        let closed = self.ensure_open();
        async move {
            closed?;
            let outcomes = tokio::task::spawn_blocking({
                let request = request.clone();
                move || transport.committed(&request, timeout)
            })
            .await??;
            into_offsets(align_outcomes(&request, outcomes))
        }
    }

    /// Look up the earliest offset whose timestamp is at or after the
    /// requested one. Partitions with no such record report
    /// [`crate::Offset::INVALID`].
    pub fn offsets_for_times_async(
        &self,
        timestamps: &[TopicPartitionTimestamp],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<TopicPartitionOffset>>> + Send {
        let request = dedup_by_partition(timestamps);
        let transport = self.transport.clone();
        let closed = self.ensure_open();
        async move {
            closed?;
            let outcomes = tokio::task::spawn_blocking({
                let request = request.clone();
                move || transport.offsets_for_times(&request, timeout)
            })
            .await??;
            into_offsets(align_outcomes(&request, outcomes))
        }
    }

    /// Leave the group and stop fetching.
    ///
    /// With auto commit enabled the stored offsets are committed first.
    /// Revocations queued by leaving are dispatched before this returns.
    #[instrument(level = "debug", skip(self))]
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.config.enable_auto_commit {
            let offsets = self.offsets.stored(&self.membership);
            if !offsets.is_empty() {
                match self.transport.commit(&offsets) {
                    Ok(outcomes) if outcomes.iter().all(|o| !o.error.is_error()) => {
                        tracing::debug!("Committed {} offsets on close", outcomes.len());
                        self.offsets.mark_sent(&offsets);
                    }
                    Ok(outcomes) => {
                        tracing::warn!("Commit on close failed for {:?}", outcomes)
                    }
                    Err(err) => tracing::warn!("Commit on close failed {:?}", err),
                }
            }
        }

        let outcome = self.transport.close();
        while let Some(event) = self.transport.poll(Duration::ZERO) {
            match event {
                Event::Record(_) | Event::PartitionEof(_) => {}
                event => {
                    if let Err(err) = self.handle_event(event) {
                        tracing::warn!("Error while closing {:?}", err);
                    }
                }
            }
        }
        tracing::info!("Closed consumer {}", self.transport.name());
        outcome
    }
}

impl<K, V> Drop for Consumer<K, V> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(
                "Consumer {} dropped without close, the group will notice when its session expires",
                self.transport.name()
            );
        }
    }
}

fn undelivered(position: &TopicPartitionOffset, error: KafkaError, raw: RawMessage) -> Error {
    tracing::warn!("Could not deliver record at {}: {}", position, error);
    ConsumeError {
        topic_partition_offset_error: TopicPartitionOffsetError::new(position, error),
        message: Some(raw),
    }
    .into()
}

/// The offset to commit once `result` has been processed.
fn next_position<K, V>(result: &ConsumeResult<K, V>) -> Result<TopicPartitionOffset> {
    if result.error().is_error() || result.message().is_none() {
        return Err(Error::InvalidArgument(format!(
            "only delivered records can be committed, result carries {}",
            result.error()
        )));
    }
    if result.topic().is_empty() {
        return Err(Error::InvalidArgument(
            "result has no topic, enable 'topic' in 'consume.result.fields'".to_owned(),
        ));
    }
    let position = result.topic_partition_offset();
    Ok(TopicPartitionOffset::new(
        position.topic,
        position.partition,
        position.offset + 1,
    ))
}

async fn commit_offsets(
    transport: Arc<dyn Transport>,
    offsets: Vec<TopicPartitionOffset>,
) -> Result<Vec<TopicPartitionOffset>> {
    let request = dedup_by_partition(&offsets);
    if let Some(empty) = request.iter().find(|tpo| tpo.topic.is_empty()) {
        return Err(Error::InvalidArgument(format!(
            "cannot commit {} without a topic",
            empty
        )));
    }

    tracing::debug!("Committing {:?}", request);
    let outcomes = tokio::task::spawn_blocking({
        let request = request.clone();
        move || transport.commit(&request)
    })
    .await??;
    into_offsets(align_outcomes(&request, outcomes))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::ClientConfig,
        consumer_builder::ConsumerBuilder,
        deserializer::StringDeserializer,
        mock::{MockCluster, MockRecord},
        offset::Offset,
    };

    fn consumer(cluster: &MockCluster, extra: &[(&str, &str)]) -> Consumer<Option<String>, Option<String>> {
        let mut config: ClientConfig = [("group.id", "g"), ("auto.offset.reset", "earliest")]
            .into_iter()
            .collect();
        for (key, value) in extra {
            config.set(*key, *value);
        }
        ConsumerBuilder::new(config)
            .key_deserializer(StringDeserializer::new())
            .value_deserializer(StringDeserializer::new())
            .build(cluster)
            .unwrap()
    }

    #[test]
    fn zero_timeout_returns_timed_out_marker() {
        let cluster = MockCluster::new();
        let mut consumer = consumer(&cluster, &[]);

        let result = consumer.consume(Duration::ZERO).unwrap();

        assert!(result.is_timed_out());
        assert!(result.message().is_none());
    }

    #[test]
    fn hidden_fields_are_not_marshaled() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 1).unwrap();
        cluster
            .produce("t", 0, MockRecord::new().value("v").header("h", "x"))
            .unwrap();
        let mut consumer = consumer(&cluster, &[("consume.result.fields", "none")]);
        consumer
            .assign(&[TopicPartitionOffset::new("t", 0, Offset::BEGINNING)])
            .unwrap();

        let result = consumer.consume(Duration::from_secs(1)).unwrap();

        assert_eq!(result.topic(), "");
        assert_eq!(result.partition(), 0);
        assert!(result.headers().is_none());
        assert_eq!(result.timestamp(), Some(Timestamp::not_available()));
        let err = next_position(&result).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn corrupt_record_surfaces_raw_bytes() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 1).unwrap();
        cluster
            .produce("t", 0, MockRecord::new().key("k").value("v"))
            .unwrap();
        cluster
            .produce("t", 0, MockRecord::new().value("next"))
            .unwrap();
        cluster
            .corrupt_record(&TopicPartition::new("t", 0), Offset::new(0))
            .unwrap();
        let mut consumer = consumer(&cluster, &[]);
        consumer
            .assign(&[TopicPartitionOffset::new("t", 0, Offset::BEGINNING)])
            .unwrap();

        let err = consumer.consume(Duration::from_secs(1)).unwrap_err();
        match err {
            Error::Consume(err) => {
                assert_eq!(err.error().code(), KafkaCode::CorruptMessage);
                assert_eq!(err.topic_partition_offset().offset, Offset::new(0));
                assert_eq!(err.raw_key().map(|k| &k[..]), Some(&b"k"[..]));
            }
            other => panic!("unexpected {:?}", other),
        }

        let result = consumer.consume(Duration::from_secs(1)).unwrap();
        assert_eq!(result.offset(), Offset::new(1));
        assert_eq!(result.value(), Some(&Some("next".to_owned())));
    }

    #[test]
    fn seek_requires_assignment() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 1).unwrap();
        let mut consumer = consumer(&cluster, &[]);

        let err = consumer
            .seek(&TopicPartitionOffset::new("t", 0, 3))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn consume_after_close_is_rejected() {
        let cluster = MockCluster::new();
        let mut consumer = consumer(&cluster, &[]);
        consumer.close().unwrap();
        consumer.close().unwrap();

        assert!(matches!(
            consumer.consume(Duration::ZERO),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn cancelled_token_stops_blocking_consume() {
        let cluster = MockCluster::new();
        let mut consumer = consumer(&cluster, &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            consumer.consume_until_cancelled(&cancel),
            Err(Error::Cancelled)
        ));
    }
}
