//! Subscription and partition assignment of one consumer.
//!
//! The assignment is tracked client side: it is exactly the last list
//! successfully handed to [`Membership::assign`], which may come from the
//! application or from a rebalance.

use std::sync::Arc;

use tracing::instrument;

use crate::{
    error::{Error, KafkaCode, KafkaError, Result},
    offset::Offset,
    topic_partition::{dedup_by_partition, TopicPartition, TopicPartitionError, TopicPartitionOffset},
    transport::Transport,
};

#[derive(Debug)]
pub struct Membership {
    transport: Arc<dyn Transport>,
    assignment: Vec<TopicPartitionOffset>,
    /// Bumped on every assignment change.
    epoch: u64,
}

impl Membership {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            assignment: vec![],
            epoch: 0,
        }
    }

    /// Replace the assignment. Offsets other than `INVALID` override the
    /// committed position of their partition.
    #[instrument(level = "debug", skip(self))]
    pub fn assign(&mut self, partitions: &[TopicPartitionOffset]) -> Result<()> {
        let partitions = dedup_by_partition(partitions);
        self.transport.assign(&partitions)?;
        tracing::debug!("Assigned {} partitions", partitions.len());
        self.assignment = partitions;
        self.epoch += 1;
        Ok(())
    }

    /// Assign partitions, resuming each one from its committed offset.
    pub fn assign_partitions(&mut self, partitions: &[TopicPartition]) -> Result<()> {
        let partitions: Vec<TopicPartitionOffset> = partitions
            .iter()
            .map(|tp| tp.with_offset(Offset::INVALID))
            .collect();
        self.assign(&partitions)
    }

    pub fn unassign(&mut self) -> Result<()> {
        self.assign(&[])
    }

    pub fn assignment(&self) -> Vec<TopicPartition> {
        self.assignment
            .iter()
            .map(TopicPartitionOffset::topic_partition)
            .collect()
    }

    pub fn is_assigned(&self, topic_partition: &TopicPartition) -> bool {
        self.assignment
            .iter()
            .any(|tpo| tpo.topic == topic_partition.topic && tpo.partition == topic_partition.partition)
    }

    /// Assigned partitions with the offsets they were assigned at.
    pub(crate) fn assigned_offsets(&self) -> &[TopicPartitionOffset] {
        &self.assignment
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    #[instrument(level = "debug", skip(self))]
    pub fn subscribe(&mut self, topics: &[String]) -> Result<()> {
        if topics.is_empty() || topics.iter().any(|topic| topic.is_empty()) {
            return Err(Error::InvalidArgument(
                "subscription needs at least one non-empty topic name".to_owned(),
            ));
        }
        let mut deduped: Vec<String> = Vec::with_capacity(topics.len());
        for topic in topics {
            if !deduped.contains(topic) {
                deduped.push(topic.clone());
            }
        }
        self.transport.subscribe(&deduped)
    }

    pub fn unsubscribe(&mut self) -> Result<()> {
        self.transport.unsubscribe()
    }

    pub fn subscription(&self) -> Vec<String> {
        self.transport.subscription()
    }

    pub fn member_id(&self) -> String {
        self.transport.member_id()
    }

    pub fn pause(&mut self, partitions: &[TopicPartition]) -> Result<()> {
        self.set_paused(partitions, true)
    }

    pub fn resume(&mut self, partitions: &[TopicPartition]) -> Result<()> {
        self.set_paused(partitions, false)
    }

    /// Forward assigned partitions to the transport; everything else fails
    /// with `LocalUnknownPartition`. Outcomes come back in request order.
    fn set_paused(&mut self, partitions: &[TopicPartition], paused: bool) -> Result<()> {
        let partitions = dedup_by_partition(partitions);
        let assigned: Vec<TopicPartition> = partitions
            .iter()
            .filter(|tp| self.is_assigned(tp))
            .cloned()
            .collect();

        let mut forwarded = if paused {
            self.transport.pause(&assigned)
        } else {
            self.transport.resume(&assigned)
        }
        .into_iter();

        let outcomes: Vec<TopicPartitionError> = partitions
            .iter()
            .map(|tp| {
                if !self.is_assigned(tp) {
                    return TopicPartitionError::new(
                        tp,
                        KafkaError::new(KafkaCode::LocalUnknownPartition),
                    );
                }
                forwarded
                    .find(|outcome| &outcome.topic_partition() == tp)
                    .unwrap_or_else(|| {
                        TopicPartitionError::new(tp, KafkaError::new(KafkaCode::Unknown))
                    })
            })
            .collect();

        if outcomes.iter().any(|outcome| outcome.error.is_error()) {
            return Err(Error::TopicPartitionErrors(outcomes));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::ClientConfig,
        mock::MockCluster,
        transport::Connect,
    };

    fn membership(cluster: &MockCluster) -> Membership {
        let config: ClientConfig = [("group.id", "g")].into_iter().collect();
        Membership::new(cluster.connect(&config).unwrap())
    }

    #[test]
    fn assign_replaces_the_previous_assignment() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 3).unwrap();
        let mut membership = membership(&cluster);

        membership
            .assign_partitions(&[TopicPartition::new("t", 0), TopicPartition::new("t", 1)])
            .unwrap();
        membership
            .assign_partitions(&[TopicPartition::new("t", 2)])
            .unwrap();

        assert_eq!(membership.assignment(), vec![TopicPartition::new("t", 2)]);
        assert_eq!(membership.epoch(), 2);

        membership.unassign().unwrap();
        assert!(membership.assignment().is_empty());
    }

    #[test]
    fn pause_of_unassigned_partition_reports_every_entry() {
        let cluster = MockCluster::new();
        cluster.create_topic("t", 2).unwrap();
        let mut membership = membership(&cluster);
        membership
            .assign_partitions(&[TopicPartition::new("t", 0)])
            .unwrap();

        let err = membership
            .pause(&[TopicPartition::new("t", 1), TopicPartition::new("t", 0)])
            .unwrap_err();

        match err {
            Error::TopicPartitionErrors(outcomes) => {
                assert_eq!(outcomes.len(), 2);
                assert_eq!(outcomes[0].error.code(), KafkaCode::LocalUnknownPartition);
                assert_eq!(outcomes[1].error.code(), KafkaCode::None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subscribe_rejects_empty_topic_list() {
        let cluster = MockCluster::new();
        let mut membership = membership(&cluster);
        assert!(matches!(
            membership.subscribe(&[]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
