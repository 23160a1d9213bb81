//! Client side offset bookkeeping.
//!
//! Two offsets are tracked per assigned partition:
//! - the *position*, the offset of the next record the application will
//!   see from that partition;
//! - the *stored* offset, the next offset to commit.
//!
//! Both are reset when the assignment changes. Stored offsets are
//! committed by the auto-commit timer or by an explicit commit.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::{
    error::{Error, KafkaCode, KafkaError, Result},
    membership::Membership,
    message::CommittedOffsets,
    offset::Offset,
    topic_partition::{
        dedup_by_partition, PartitionKeyed, TopicPartition, TopicPartitionOffset,
        TopicPartitionOffsetError,
    },
};

#[derive(Debug)]
struct AutoCommit {
    interval: Duration,
    last_run: Instant,
    /// What the timer last sent per partition.
    sent: HashMap<TopicPartition, Offset>,
}

impl AutoCommit {
    fn mark_sent(&mut self, offsets: &[TopicPartitionOffset]) {
        for tpo in offsets {
            self.sent.insert(tpo.key(), tpo.offset);
        }
    }
}

#[derive(Debug)]
pub(crate) struct OffsetTracker {
    positions: HashMap<TopicPartition, Offset>,
    stored: HashMap<TopicPartition, Offset>,
    auto_store: bool,
    auto_commit: Option<AutoCommit>,
}

impl OffsetTracker {
    pub fn new(auto_store: bool, auto_commit_interval: Option<Duration>) -> Self {
        Self {
            positions: HashMap::new(),
            stored: HashMap::new(),
            auto_store,
            auto_commit: auto_commit_interval.map(|interval| AutoCommit {
                interval,
                last_run: Instant::now(),
                sent: HashMap::new(),
            }),
        }
    }

    /// Forget everything about partitions that are no longer assigned and
    /// restart positions of the ones that are.
    pub fn on_assign(&mut self, assigned: &[TopicPartitionOffset]) {
        self.positions = assigned
            .iter()
            .map(|tpo| {
                let position = if tpo.offset.is_concrete() {
                    tpo.offset
                } else {
                    Offset::INVALID
                };
                (tpo.topic_partition(), position)
            })
            .collect();
        self.stored
            .retain(|tp, _| assigned.iter().any(|tpo| &tpo.key() == tp));
        if let Some(auto_commit) = self.auto_commit.as_mut() {
            auto_commit
                .sent
                .retain(|tp, _| assigned.iter().any(|tpo| &tpo.key() == tp));
        }
    }

    /// A record at `offset` was handed to the application.
    pub fn on_delivered(&mut self, topic_partition: TopicPartition, offset: Offset) {
        let next = offset + 1;
        if self.auto_store {
            self.stored.insert(topic_partition.clone(), next);
        }
        self.positions.insert(topic_partition, next);
    }

    /// A record at `offset` was read but could not be delivered.
    pub fn on_undelivered(&mut self, topic_partition: TopicPartition, offset: Offset) {
        self.positions.insert(topic_partition, offset + 1);
    }

    /// The end of a partition was reached; `offset` is the next one to arrive.
    pub fn on_eof(&mut self, topic_partition: TopicPartition, offset: Offset) {
        self.positions.insert(topic_partition, offset);
    }

    pub fn on_seek(&mut self, topic_partition: TopicPartition, offset: Offset) {
        let position = if offset.is_concrete() {
            offset
        } else {
            Offset::INVALID
        };
        self.positions.insert(topic_partition, position);
    }

    pub fn auto_store(&self) -> bool {
        self.auto_store
    }

    /// Positions of `partitions`, failing for the ones not assigned.
    pub fn positions(
        &self,
        membership: &Membership,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartitionOffset>> {
        let outcomes: Vec<TopicPartitionOffsetError> = dedup_by_partition(partitions)
            .iter()
            .map(|tp| {
                if membership.is_assigned(tp) {
                    let position = self.positions.get(tp).copied().unwrap_or_default();
                    TopicPartitionOffsetError::new(&tp.with_offset(position), KafkaError::no_error())
                } else {
                    TopicPartitionOffsetError::new(
                        &tp.with_offset(Offset::INVALID),
                        KafkaError::new(KafkaCode::LocalUnknownPartition),
                    )
                }
            })
            .collect();

        into_offsets(outcomes)
    }

    /// Remember offsets to commit later.
    pub fn store(
        &mut self,
        membership: &Membership,
        offsets: &[TopicPartitionOffset],
    ) -> Result<()> {
        if self.auto_store {
            return Err(Error::InvalidState(
                "offsets cannot be stored explicitly while 'enable.auto.offset.store' is true"
                    .to_owned(),
            ));
        }

        let mut failed = false;
        let outcomes: Vec<TopicPartitionOffsetError> = dedup_by_partition(offsets)
            .into_iter()
            .map(|tpo| {
                let tp = tpo.topic_partition();
                let error = if !membership.is_assigned(&tp) {
                    KafkaError::new(KafkaCode::LocalUnknownPartition)
                } else if !tpo.offset.is_concrete() {
                    KafkaError::with_reason(
                        KafkaCode::LocalInvalidArg,
                        format!("cannot store {}", tpo.offset),
                    )
                } else {
                    self.stored.insert(tp, tpo.offset);
                    KafkaError::no_error()
                };
                failed |= error.is_error();
                TopicPartitionOffsetError::new(&tpo, error)
            })
            .collect();

        if failed {
            return Err(Error::TopicPartitionOffsetErrors(outcomes));
        }
        Ok(())
    }

    /// Stored offsets of the assigned partitions, in assignment order.
    pub fn stored(&self, membership: &Membership) -> Vec<TopicPartitionOffset> {
        membership
            .assignment()
            .into_iter()
            .filter_map(|tp| {
                let offset = *self.stored.get(&tp)?;
                Some(tp.with_offset(offset))
            })
            .collect()
    }

    /// Offsets the auto-commit timer should send now, if it fired.
    pub fn due_auto_commit(&mut self, membership: &Membership) -> Option<Vec<TopicPartitionOffset>> {
        let stored = self.stored(membership);
        let auto_commit = self.auto_commit.as_mut()?;
        if auto_commit.last_run.elapsed() < auto_commit.interval {
            return None;
        }
        auto_commit.last_run = Instant::now();

        let pending: Vec<TopicPartitionOffset> = stored
            .into_iter()
            .filter(|tpo| auto_commit.sent.get(&tpo.key()) != Some(&tpo.offset))
            .collect();
        if pending.is_empty() {
            return None;
        }
        auto_commit.mark_sent(&pending);
        Some(pending)
    }

    /// Stored offsets of partitions missing from `assigned` that the timer
    /// has not sent yet. They are marked as sent.
    pub fn pending_revoked(&mut self, assigned: &[TopicPartitionOffset]) -> Vec<TopicPartitionOffset> {
        let Some(auto_commit) = self.auto_commit.as_mut() else {
            return vec![];
        };

        let mut pending: Vec<TopicPartitionOffset> = self
            .stored
            .iter()
            .filter(|(tp, _)| !assigned.iter().any(|tpo| &tpo.key() == *tp))
            .filter(|(tp, offset)| auto_commit.sent.get(*tp) != Some(*offset))
            .map(|(tp, offset)| tp.with_offset(*offset))
            .collect();
        pending.sort_by_key(TopicPartitionOffset::topic_partition);
        auto_commit.mark_sent(&pending);
        pending
    }

    /// Record offsets committed outside the timer.
    pub fn mark_sent(&mut self, offsets: &[TopicPartitionOffset]) {
        if let Some(auto_commit) = self.auto_commit.as_mut() {
            auto_commit.mark_sent(offsets);
        }
    }

    /// Failed partitions are sent again on the next tick.
    pub fn on_committed(&mut self, committed: &CommittedOffsets) {
        if let Some(auto_commit) = self.auto_commit.as_mut() {
            for outcome in committed.offsets.iter().filter(|o| o.error.is_error()) {
                auto_commit.sent.remove(&outcome.topic_partition());
            }
        }
    }
}

/// Map a per-partition answer onto the request: exactly one outcome per
/// requested partition, in request order.
pub(crate) fn align_outcomes<T: PartitionKeyed>(
    request: &[T],
    outcomes: Vec<TopicPartitionOffsetError>,
) -> Vec<TopicPartitionOffsetError> {
    let mut by_partition: HashMap<TopicPartition, TopicPartitionOffsetError> = outcomes
        .into_iter()
        .map(|outcome| (outcome.topic_partition(), outcome))
        .collect();

    request
        .iter()
        .map(|entry| {
            let tp = entry.key();
            by_partition.remove(&tp).unwrap_or_else(|| {
                TopicPartitionOffsetError::new(
                    &tp.with_offset(Offset::INVALID),
                    KafkaError::with_reason(KafkaCode::Unknown, "no outcome reported for partition"),
                )
            })
        })
        .collect()
}

/// Succeed with the offsets only if every partition succeeded.
pub(crate) fn into_offsets(
    outcomes: Vec<TopicPartitionOffsetError>,
) -> Result<Vec<TopicPartitionOffset>> {
    if outcomes.iter().any(|outcome| outcome.error.is_error()) {
        return Err(Error::TopicPartitionOffsetErrors(outcomes));
    }
    Ok(outcomes
        .iter()
        .map(TopicPartitionOffsetError::topic_partition_offset)
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::ClientConfig, mock::MockCluster, transport::Connect};

    fn assigned(cluster: &MockCluster, partitions: &[TopicPartition]) -> Membership {
        let config: ClientConfig = [("group.id", "g")].into_iter().collect();
        let mut membership = Membership::new(cluster.connect(&config).unwrap());
        membership.assign_partitions(partitions).unwrap();
        membership
    }

    #[test]
    fn delivered_record_moves_position_and_store() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 1).unwrap();
        let tp = TopicPartition::new("t", 0);
        let membership = assigned(&cluster, &[tp.clone()]);
        let mut tracker = OffsetTracker::new(true, None);
        tracker.on_assign(membership.assigned_offsets());

        tracker.on_delivered(tp.clone(), Offset::new(9));

        assert_eq!(
            tracker.positions(&membership, &[tp.clone()]).unwrap(),
            vec![tp.with_offset(Offset::new(10))]
        );
        assert_eq!(tracker.stored(&membership), vec![tp.with_offset(Offset::new(10))]);
    }

    #[test]
    fn explicit_store_is_rejected_with_auto_store() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 1).unwrap();
        let membership = assigned(&cluster, &[TopicPartition::new("t", 0)]);
        let mut tracker = OffsetTracker::new(true, None);

        let err = tracker
            .store(&membership, &[TopicPartitionOffset::new("t", 0, 3)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn store_reports_unassigned_partitions() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 2).unwrap();
        let membership = assigned(&cluster, &[TopicPartition::new("t", 0)]);
        let mut tracker = OffsetTracker::new(false, None);

        let err = tracker
            .store(
                &membership,
                &[
                    TopicPartitionOffset::new("t", 0, 3),
                    TopicPartitionOffset::new("t", 1, 3),
                ],
            )
            .unwrap_err();

        match err {
            Error::TopicPartitionOffsetErrors(outcomes) => {
                assert_eq!(outcomes.len(), 2);
                assert!(!outcomes[0].error.is_error());
                assert_eq!(outcomes[1].error.code(), KafkaCode::LocalUnknownPartition);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            tracker.stored(&membership),
            vec![TopicPartitionOffset::new("t", 0, 3)]
        );
    }

    #[test]
    fn auto_commit_sends_only_changes() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 1).unwrap();
        let tp = TopicPartition::new("t", 0);
        let membership = assigned(&cluster, &[tp.clone()]);
        let mut tracker = OffsetTracker::new(true, Some(Duration::ZERO));
        tracker.on_assign(membership.assigned_offsets());

        assert_eq!(tracker.due_auto_commit(&membership), None);

        tracker.on_delivered(tp.clone(), Offset::new(0));
        assert_eq!(
            tracker.due_auto_commit(&membership),
            Some(vec![tp.with_offset(Offset::new(1))])
        );
        assert_eq!(tracker.due_auto_commit(&membership), None);
    }

    #[test]
    fn revoked_partitions_hand_back_unsent_offsets_once() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 2).unwrap();
        let kept = TopicPartition::new("t", 0);
        let revoked = TopicPartition::new("t", 1);
        let membership = assigned(&cluster, &[kept.clone(), revoked.clone()]);
        let mut tracker = OffsetTracker::new(true, Some(Duration::from_secs(60)));
        tracker.on_assign(membership.assigned_offsets());
        tracker.on_delivered(kept.clone(), Offset::new(4));
        tracker.on_delivered(revoked.clone(), Offset::new(2));

        let remaining = [kept.with_offset(Offset::INVALID)];
        assert_eq!(
            tracker.pending_revoked(&remaining),
            vec![revoked.with_offset(Offset::new(3))]
        );
        assert!(tracker.pending_revoked(&remaining).is_empty());

        tracker.mark_sent(&[kept.with_offset(Offset::new(5))]);
        assert!(tracker.pending_revoked(&[]).is_empty());
    }

    #[test]
    fn revoked_partitions_are_left_alone_without_auto_commit() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 1).unwrap();
        let tp = TopicPartition::new("t", 0);
        let membership = assigned(&cluster, &[tp.clone()]);
        let mut tracker = OffsetTracker::new(true, None);
        tracker.on_assign(membership.assigned_offsets());
        tracker.on_delivered(tp, Offset::new(0));

        assert!(tracker.pending_revoked(&[]).is_empty());
    }

    #[test]
    fn aligns_outcomes_with_the_request() {
        let request = vec![TopicPartition::new("a", 0), TopicPartition::new("b", 0)];
        let outcomes = vec![TopicPartitionOffsetError::new(
            &TopicPartitionOffset::new("b", 0, 4),
            KafkaError::no_error(),
        )];

        let aligned = align_outcomes(&request, outcomes);

        assert_eq!(aligned[0].topic, "a");
        assert_eq!(aligned[0].error.code(), KafkaCode::Unknown);
        assert_eq!(aligned[1].offset, Offset::new(4));
    }
}
