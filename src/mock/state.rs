//! Shared state of the in-memory cluster.
//!
//! Everything lives behind one mutex. Handles (one per connected client)
//! wait on the condition variable for new records or queued events.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use bytes::Bytes;
use serde_derive::Serialize;

use crate::{
    assignor::{self, MemberSubscription},
    error::{KafkaCode, KafkaError, Result},
    message::{CommittedOffsets, Headers, LogMessage, SyslogLevel, Timestamp},
    offset::Offset,
    topic_partition::{
        TopicPartition, TopicPartitionError, TopicPartitionOffset, TopicPartitionOffsetError,
        TopicPartitionTimestamp,
    },
    transport::{Event, Rebalance, Record},
    utils,
};

#[derive(Debug, Default)]
pub(super) struct Shared {
    state: Mutex<ClusterState>,
    pub changed: Condvar,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, ClusterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct ClusterState {
    pub topics: BTreeMap<String, Vec<PartitionLog>>,
    pub groups: HashMap<String, Group>,
    pub handles: HashMap<u64, Handle>,
    pub denied_topics: HashSet<String>,
    pub next_handle: u64,
}

#[derive(Debug, Default)]
pub(super) struct PartitionLog {
    pub records: Vec<StoredRecord>,
}

#[derive(Debug, Clone)]
pub(super) struct StoredRecord {
    pub timestamp: Timestamp,
    pub headers: Headers,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub error: KafkaError,
}

#[derive(Debug, Default)]
pub(super) struct Group {
    pub generation: i32,
    /// Handle ids in join order.
    pub members: Vec<u64>,
    pub committed: HashMap<TopicPartition, Offset>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum ResetPolicy {
    Earliest,
    Latest,
    Error,
}

/// Fetch state of one assigned partition.
#[derive(Debug)]
pub(super) struct Fetch {
    pub topic_partition: TopicPartition,
    /// Where fetching was asked to start.
    pub start: Offset,
    /// Next offset to hand out, once `start` was resolved.
    pub position: Option<i64>,
    pub paused: bool,
    pub eof_at: Option<i64>,
    /// A fetch error was already reported for this partition.
    pub reported: bool,
}

impl Fetch {
    fn new(topic_partition: TopicPartition, start: Offset) -> Self {
        Self {
            topic_partition,
            start,
            position: None,
            paused: false,
            eof_at: None,
            reported: false,
        }
    }
}

/// One connected client instance.
#[derive(Debug)]
pub(super) struct Handle {
    pub name: String,
    pub client_id: String,
    pub group_id: String,
    pub strategy: String,
    pub member_id: Option<String>,
    pub subscription: Vec<String>,
    /// Partitions the coordinator gave this member.
    pub owned: Vec<TopicPartition>,
    pub fetches: Vec<Fetch>,
    pub cursor: usize,
    pub events: VecDeque<Event>,
    pub reset: ResetPolicy,
    pub partition_eof: bool,
    pub session_timeout: Duration,
    pub statistics_interval: Option<Duration>,
    pub last_statistics: Instant,
    /// Cleared when the transport was dropped without closing.
    pub alive: bool,
    pub last_seen: Instant,
    pub closed: bool,
}

impl Handle {
    fn push(&mut self, event: Event) {
        if self.alive && !self.closed {
            self.events.push_back(event);
        }
    }

    fn log(&mut self, level: SyslogLevel, facility: &str, message: String) {
        let log = LogMessage {
            name: self.name.clone(),
            level,
            facility: facility.to_owned(),
            message,
        };
        self.push(Event::Log(log));
    }
}

fn closed() -> KafkaError {
    KafkaError::with_reason(KafkaCode::LocalState, "client instance is closed")
}

/// Turn a requested start offset into a concrete one.
fn resolve(
    start: Offset,
    log_end: i64,
    committed: Option<Offset>,
    reset: ResetPolicy,
) -> Option<i64> {
    if start.is_concrete() {
        return Some(start.value());
    }
    if start == Offset::BEGINNING {
        return Some(0);
    }
    if start == Offset::END {
        return Some(log_end);
    }
    if let Some(n) = start.tail_count() {
        return Some((log_end - n).max(0));
    }
    match committed.filter(Offset::is_concrete) {
        Some(offset) => Some(offset.value()),
        None => match reset {
            ResetPolicy::Earliest => Some(0),
            ResetPolicy::Latest => Some(log_end),
            ResetPolicy::Error => None,
        },
    }
}

impl ClusterState {
    pub fn handle(&self, id: u64) -> std::result::Result<&Handle, KafkaError> {
        match self.handles.get(&id) {
            Some(handle) if !handle.closed => Ok(handle),
            _ => Err(closed()),
        }
    }

    pub fn handle_mut(&mut self, id: u64) -> std::result::Result<&mut Handle, KafkaError> {
        match self.handles.get_mut(&id) {
            Some(handle) if !handle.closed => Ok(handle),
            _ => Err(closed()),
        }
    }

    fn partition_log(&self, topic_partition: &TopicPartition) -> Option<&PartitionLog> {
        let partition = usize::try_from(topic_partition.partition).ok()?;
        self.topics.get(&topic_partition.topic)?.get(partition)
    }

    fn partition_log_mut(&mut self, topic_partition: &TopicPartition) -> Option<&mut PartitionLog> {
        let partition = usize::try_from(topic_partition.partition).ok()?;
        self.topics
            .get_mut(&topic_partition.topic)?
            .get_mut(partition)
    }

    /// Check that a partition exists and may be accessed.
    fn check_access(&self, topic_partition: &TopicPartition) -> KafkaError {
        if self.denied_topics.contains(&topic_partition.topic) {
            KafkaError::new(KafkaCode::TopicAuthorizationFailed)
        } else if self.partition_log(topic_partition).is_none() {
            KafkaError::new(KafkaCode::UnknownTopicOrPartition)
        } else {
            KafkaError::no_error()
        }
    }

    pub fn create_topic(&mut self, name: &str, partitions: i32) -> Result<()> {
        if partitions <= 0 {
            return Err(KafkaError::with_reason(
                KafkaCode::LocalInvalidArg,
                "a topic needs at least one partition",
            )
            .into());
        }
        if self.topics.contains_key(name) {
            return Err(KafkaError::with_reason(
                KafkaCode::LocalInvalidArg,
                format!("topic {} already exists", name),
            )
            .into());
        }
        self.topics.insert(
            name.to_owned(),
            (0..partitions).map(|_| PartitionLog::default()).collect(),
        );
        tracing::debug!("Created topic {} with {} partitions", name, partitions);

        let affected: Vec<String> = self
            .groups
            .iter()
            .filter(|(_, group)| {
                group.members.iter().any(|id| {
                    self.handles
                        .get(id)
                        .map_or(false, |h| h.subscription.iter().any(|t| t == name))
                })
            })
            .map(|(group_id, _)| group_id.clone())
            .collect();
        for group_id in affected {
            self.rebalance(&group_id);
        }
        Ok(())
    }

    pub fn append(&mut self, topic_partition: &TopicPartition, record: StoredRecord) -> Result<Offset> {
        let log = self
            .partition_log_mut(topic_partition)
            .ok_or_else(|| KafkaError::new(KafkaCode::UnknownTopicOrPartition))?;
        log.records.push(record);
        Ok(Offset::new(log.records.len() as i64 - 1))
    }

    pub fn corrupt(&mut self, topic_partition: &TopicPartition, offset: Offset) -> Result<()> {
        let record = self
            .partition_log_mut(topic_partition)
            .and_then(|log| log.records.get_mut(usize::try_from(offset.value()).ok()?))
            .ok_or_else(|| KafkaError::new(KafkaCode::OffsetOutOfRange))?;
        record.error = KafkaError::with_reason(
            KafkaCode::CorruptMessage,
            format!("record {} of {} failed its checksum", offset, topic_partition),
        );
        Ok(())
    }

    pub fn high_watermark(&self, topic_partition: &TopicPartition) -> Option<Offset> {
        self.partition_log(topic_partition)
            .map(|log| Offset::new(log.records.len() as i64))
    }

    pub fn broadcast(&mut self, error: &KafkaError) {
        for handle in self.handles.values_mut() {
            handle.push(Event::Error(error.clone()));
        }
    }

    // group membership

    pub fn subscribe(&mut self, id: u64, topics: &[String]) -> Result<()> {
        let handle = self.handle_mut(id)?;
        handle.subscription = topics.to_vec();
        if handle.member_id.is_none() {
            let member_id = format!("{}-{}", handle.client_id, id);
            handle.log(
                SyslogLevel::Info,
                "JOIN",
                format!("joining group {} as {}", handle.group_id, member_id),
            );
            handle.member_id = Some(member_id);
            let group_id = handle.group_id.clone();
            self.groups.entry(group_id.clone()).or_default().members.push(id);
            self.rebalance(&group_id);
        } else {
            let group_id = handle.group_id.clone();
            self.rebalance(&group_id);
        }
        Ok(())
    }

    /// Take a handle out of its group, revoking what it owned.
    pub fn leave(&mut self, id: u64) {
        let Some(handle) = self.handles.get_mut(&id) else {
            return;
        };
        let Some(member_id) = handle.member_id.take() else {
            return;
        };
        handle.subscription.clear();
        let owned = std::mem::take(&mut handle.owned);
        if !owned.is_empty() {
            handle.push(Event::Rebalance(Rebalance::Revoke(owned)));
        }
        handle.log(
            SyslogLevel::Info,
            "LEAVE",
            format!("{} left group {}", member_id, handle.group_id),
        );

        let group_id = handle.group_id.clone();
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.members.retain(|member| *member != id);
        }
        self.rebalance(&group_id);
    }

    /// Revoke everything in the group, then hand out a fresh assignment.
    fn rebalance(&mut self, group_id: &str) {
        let Some(group) = self.groups.get_mut(group_id) else {
            return;
        };
        if group.members.is_empty() {
            return;
        }
        group.generation += 1;
        let generation = group.generation;
        let member_ids = group.members.clone();

        let mut subscriptions = Vec::with_capacity(member_ids.len());
        for id in &member_ids {
            if let Some(handle) = self.handles.get_mut(id) {
                let owned = std::mem::take(&mut handle.owned);
                if !owned.is_empty() {
                    handle.push(Event::Rebalance(Rebalance::Revoke(owned)));
                }
                subscriptions.push((
                    *id,
                    handle.member_id.clone().unwrap_or_default(),
                    handle.subscription.clone(),
                    handle.strategy.clone(),
                ));
            }
        }

        let topic_partitions: BTreeMap<String, Vec<i32>> = self
            .topics
            .iter()
            .map(|(name, logs)| (name.clone(), (0..logs.len() as i32).collect()))
            .collect();
        let members: Vec<MemberSubscription> = subscriptions
            .iter()
            .map(|(_, member_id, topics, _)| MemberSubscription { member_id, topics })
            .collect();
        let strategy = subscriptions
            .first()
            .map(|(_, _, _, strategy)| strategy.clone())
            .unwrap_or_else(|| assignor::ROUND_ROBIN_PROTOCOL.to_owned());

        let assignments = match assignor::assign(&strategy, &members, &topic_partitions) {
            Ok(assignments) => assignments,
            Err(err) => {
                tracing::error!("ERROR: Assignment for group {} failed {:?}", group_id, err);
                let error = KafkaError::with_reason(KafkaCode::InconsistentGroupProtocol, err.to_string());
                for (id, ..) in &subscriptions {
                    if let Some(handle) = self.handles.get_mut(id) {
                        handle.push(Event::Error(error.clone()));
                    }
                }
                return;
            }
        };

        tracing::debug!(
            "Group {} generation {} | {} members",
            group_id,
            generation,
            subscriptions.len()
        );
        for ((id, ..), assignment) in subscriptions.iter().zip(assignments) {
            if let Some(handle) = self.handles.get_mut(id) {
                handle.owned = assignment.clone();
                handle.log(
                    SyslogLevel::Debug,
                    "ASSIGN",
                    format!(
                        "generation {} assigned {} partitions",
                        generation,
                        assignment.len()
                    ),
                );
                handle.push(Event::Rebalance(Rebalance::Assign(assignment)));
            }
        }
    }

    /// Drop members whose transport went away and whose session ran out.
    ///
    /// Returns true if any group changed.
    pub fn expire_sessions(&mut self) -> bool {
        let expired: Vec<u64> = self
            .handles
            .iter()
            .filter(|(_, h)| !h.alive && h.last_seen.elapsed() >= h.session_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            tracing::debug!("Session of handle {} expired", id);
            self.leave(*id);
            self.handles.remove(id);
        }
        !expired.is_empty()
    }

    // fetching

    pub fn assign(&mut self, id: u64, partitions: &[TopicPartitionOffset]) -> Result<()> {
        if partitions.is_empty() {
            // unassigning is allowed while closing
            if let Some(handle) = self.handles.get_mut(&id) {
                handle.fetches.clear();
            }
            return Ok(());
        }
        let handle = self.handle_mut(id)?;
        handle.fetches = partitions
            .iter()
            .map(|tpo| Fetch::new(tpo.topic_partition(), tpo.offset))
            .collect();
        handle.cursor = 0;
        Ok(())
    }

    pub fn seek(&mut self, id: u64, partition: &TopicPartitionOffset) -> Result<()> {
        let handle = self.handle_mut(id)?;
        let topic_partition = partition.topic_partition();
        let fetch = handle
            .fetches
            .iter_mut()
            .find(|fetch| fetch.topic_partition == topic_partition)
            .ok_or_else(|| KafkaError::new(KafkaCode::LocalUnknownPartition))?;
        *fetch = Fetch {
            paused: fetch.paused,
            ..Fetch::new(topic_partition, partition.offset)
        };
        Ok(())
    }

    pub fn set_paused(
        &mut self,
        id: u64,
        partitions: &[TopicPartition],
        paused: bool,
    ) -> Vec<TopicPartitionError> {
        let Ok(handle) = self.handle_mut(id) else {
            return partitions
                .iter()
                .map(|tp| TopicPartitionError::new(tp, closed()))
                .collect();
        };
        partitions
            .iter()
            .map(|tp| {
                match handle
                    .fetches
                    .iter_mut()
                    .find(|fetch| &fetch.topic_partition == tp)
                {
                    Some(fetch) => {
                        fetch.paused = paused;
                        TopicPartitionError::new(tp, KafkaError::no_error())
                    }
                    None => TopicPartitionError::new(
                        tp,
                        KafkaError::new(KafkaCode::LocalUnknownPartition),
                    ),
                }
            })
            .collect()
    }

    /// Next event for a handle: queued events first, then fetched data.
    pub fn next_event(&mut self, id: u64) -> Option<Event> {
        let ClusterState {
            topics,
            groups,
            handles,
            denied_topics,
            ..
        } = self;
        let handle = handles.get_mut(&id)?;

        if let Some(interval) = handle.statistics_interval {
            if !handle.closed && handle.last_statistics.elapsed() >= interval {
                handle.last_statistics = Instant::now();
                let report = statistics(handle, topics, groups.get(&handle.group_id));
                handle.push(Event::Statistics(report));
            }
        }

        if let Some(event) = handle.events.pop_front() {
            return Some(event);
        }
        if handle.closed {
            return None;
        }

        let committed = groups.get(&handle.group_id).map(|group| &group.committed);
        let count = handle.fetches.len();
        for step in 0..count {
            let index = (handle.cursor + step) % count;
            let fetch = &mut handle.fetches[index];
            if fetch.paused {
                continue;
            }

            let event = fetch_one(
                fetch,
                topics,
                denied_topics,
                committed,
                handle.reset,
                handle.partition_eof,
            );
            if event.is_some() {
                handle.cursor = (index + 1) % count;
                return event;
            }
        }
        None
    }

    // offsets

    pub fn commit(
        &mut self,
        id: u64,
        offsets: &[TopicPartitionOffset],
    ) -> Result<Vec<TopicPartitionOffsetError>> {
        let group_id = self.handle(id)?.group_id.clone();

        let mut outcomes = Vec::with_capacity(offsets.len());
        for tpo in offsets {
            let topic_partition = tpo.topic_partition();
            let mut error = self.check_access(&topic_partition);
            if !error.is_error() && !tpo.offset.is_concrete() {
                error = KafkaError::with_reason(
                    KafkaCode::LocalInvalidArg,
                    format!("cannot commit {}", tpo.offset),
                );
            }
            if !error.is_error() {
                self.groups
                    .entry(group_id.clone())
                    .or_default()
                    .committed
                    .insert(topic_partition, tpo.offset);
            }
            outcomes.push(TopicPartitionOffsetError::new(tpo, error));
        }

        let error = outcomes
            .iter()
            .map(|outcome| outcome.error.clone())
            .find(KafkaError::is_error)
            .unwrap_or_default();
        if let Some(handle) = self.handles.get_mut(&id) {
            handle.push(Event::OffsetsCommitted(CommittedOffsets {
                offsets: outcomes.clone(),
                error,
            }));
        }
        Ok(outcomes)
    }

    pub fn committed(
        &self,
        id: u64,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartitionOffsetError>> {
        let handle = self.handle(id)?;
        let committed = self.groups.get(&handle.group_id).map(|g| &g.committed);

        Ok(partitions
            .iter()
            .map(|tp| {
                let offset = committed
                    .and_then(|c| c.get(tp).copied())
                    .unwrap_or(Offset::INVALID);
                TopicPartitionOffsetError::new(&tp.with_offset(offset), self.check_access(tp))
            })
            .collect())
    }

    pub fn offsets_for_times(
        &self,
        id: u64,
        timestamps: &[TopicPartitionTimestamp],
    ) -> Result<Vec<TopicPartitionOffsetError>> {
        self.handle(id)?;

        Ok(timestamps
            .iter()
            .map(|tpt| {
                let topic_partition = tpt.topic_partition();
                let error = self.check_access(&topic_partition);
                let offset = match self.partition_log(&topic_partition) {
                    Some(log) if !error.is_error() => log
                        .records
                        .iter()
                        .position(|record| record.timestamp.unix_timestamp_ms >= tpt.timestamp)
                        .map(|index| Offset::new(index as i64))
                        .unwrap_or(Offset::INVALID),
                    _ => Offset::INVALID,
                };
                TopicPartitionOffsetError::new(&topic_partition.with_offset(offset), error)
            })
            .collect())
    }
}

fn fetch_one(
    fetch: &mut Fetch,
    topics: &BTreeMap<String, Vec<PartitionLog>>,
    denied_topics: &HashSet<String>,
    committed: Option<&HashMap<TopicPartition, Offset>>,
    reset: ResetPolicy,
    partition_eof: bool,
) -> Option<Event> {
    let topic_partition = &fetch.topic_partition;

    let log = usize::try_from(topic_partition.partition)
        .ok()
        .and_then(|partition| topics.get(&topic_partition.topic)?.get(partition));
    let log = match log {
        Some(log) if !denied_topics.contains(&topic_partition.topic) => log,
        Some(_) => {
            return report_once(fetch, KafkaCode::TopicAuthorizationFailed);
        }
        None => {
            return report_once(fetch, KafkaCode::UnknownTopicOrPartition);
        }
    };
    let log_end = log.records.len() as i64;

    let position = match fetch.position {
        Some(position) => position,
        None => {
            let committed = committed.and_then(|c| c.get(topic_partition).copied());
            match resolve(fetch.start, log_end, committed, reset) {
                Some(position) => {
                    fetch.position = Some(position);
                    position
                }
                None => return report_once(fetch, KafkaCode::OffsetOutOfRange),
            }
        }
    };

    match usize::try_from(position).ok().and_then(|i| log.records.get(i)) {
        Some(stored) => {
            fetch.position = Some(position + 1);
            fetch.eof_at = None;
            Some(Event::Record(Record {
                topic: topic_partition.topic.clone(),
                partition: topic_partition.partition,
                offset: Offset::new(position),
                timestamp: stored.timestamp,
                headers: stored.headers.clone(),
                key: stored.key.clone(),
                value: stored.value.clone(),
                error: stored.error.clone(),
            }))
        }
        None if partition_eof && fetch.eof_at != Some(position) => {
            fetch.eof_at = Some(position);
            Some(Event::PartitionEof(
                topic_partition.with_offset(Offset::new(position)),
            ))
        }
        None => None,
    }
}

fn report_once(fetch: &mut Fetch, code: KafkaCode) -> Option<Event> {
    if fetch.reported {
        return None;
    }
    fetch.reported = true;
    Some(Event::Error(KafkaError::with_reason(
        code,
        format!("cannot fetch {}", fetch.topic_partition),
    )))
}

#[derive(Serialize)]
struct StatisticsReport<'a> {
    name: &'a str,
    client_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    /// Microseconds since the unix epoch.
    ts: i64,
    cgrp: GroupStatistics,
    topics: BTreeMap<&'a str, TopicStatistics>,
}

#[derive(Serialize)]
struct GroupStatistics {
    state: &'static str,
    rebalance_cnt: i32,
    assignment_size: usize,
}

#[derive(Serialize, Default)]
struct TopicStatistics {
    topic: String,
    partitions: BTreeMap<String, PartitionStatistics>,
}

#[derive(Serialize)]
struct PartitionStatistics {
    partition: i32,
    fetch_offset: i64,
    hi_offset: i64,
    consumer_lag: i64,
    paused: bool,
}

fn statistics(
    handle: &Handle,
    topics: &BTreeMap<String, Vec<PartitionLog>>,
    group: Option<&Group>,
) -> String {
    let mut per_topic: BTreeMap<&str, TopicStatistics> = BTreeMap::new();
    for fetch in &handle.fetches {
        let tp = &fetch.topic_partition;
        let hi_offset = usize::try_from(tp.partition)
            .ok()
            .and_then(|partition| topics.get(&tp.topic)?.get(partition))
            .map_or(-1, |log| log.records.len() as i64);
        let fetch_offset = fetch.position.unwrap_or(-1);
        let consumer_lag = if fetch_offset >= 0 && hi_offset >= 0 {
            hi_offset - fetch_offset
        } else {
            -1
        };

        let entry = per_topic
            .entry(tp.topic.as_str())
            .or_insert_with(|| TopicStatistics {
                topic: tp.topic.clone(),
                ..Default::default()
            });
        entry.partitions.insert(
            tp.partition.to_string(),
            PartitionStatistics {
                partition: tp.partition,
                fetch_offset,
                hi_offset,
                consumer_lag,
                paused: fetch.paused,
            },
        );
    }

    let report = StatisticsReport {
        name: &handle.name,
        client_id: &handle.client_id,
        kind: "consumer",
        ts: utils::now() * 1000,
        cgrp: GroupStatistics {
            state: if handle.member_id.is_some() {
                "up"
            } else {
                "init"
            },
            rebalance_cnt: group.map_or(0, |g| g.generation),
            assignment_size: handle.owned.len(),
        },
        topics: per_topic,
    };
    serde_json::to_string(&report).unwrap_or_else(|err| {
        tracing::error!("ERROR: Serializing statistics failed {:?}", err);
        String::from("{}")
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_sentinels_against_the_log() {
        let reset = ResetPolicy::Latest;
        assert_eq!(resolve(Offset::new(3), 10, None, reset), Some(3));
        assert_eq!(resolve(Offset::BEGINNING, 10, None, reset), Some(0));
        assert_eq!(resolve(Offset::END, 10, None, reset), Some(10));
        assert_eq!(resolve(Offset::tail(4), 10, None, reset), Some(6));
        assert_eq!(resolve(Offset::tail(40), 10, None, reset), Some(0));
        assert_eq!(resolve(Offset::INVALID, 10, Some(Offset::new(7)), reset), Some(7));
        assert_eq!(resolve(Offset::STORED, 10, None, reset), Some(10));
        assert_eq!(
            resolve(Offset::INVALID, 10, None, ResetPolicy::Earliest),
            Some(0)
        );
        assert_eq!(resolve(Offset::INVALID, 10, None, ResetPolicy::Error), None);
    }
}
