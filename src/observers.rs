//! Application callbacks for events that are not records.
//!
//! Every observer runs on the thread that called consume, in registration
//! order, before that consume call returns.

use std::fmt;

use crate::{
    error::{KafkaCode, KafkaError},
    membership::Membership,
    message::{CommittedOffsets, LogMessage, SyslogLevel},
    topic_partition::TopicPartition,
    transport::Rebalance,
};

/// Called with the partitions of a rebalance. The handler owns the
/// assignment decision: it should call [`Membership::assign`] or
/// [`Membership::unassign`].
pub type PartitionsHandler = Box<dyn FnMut(&mut Membership, &[TopicPartition]) + Send>;
pub type CommittedHandler = Box<dyn FnMut(&CommittedOffsets) + Send>;
pub type ErrorHandler = Box<dyn FnMut(&KafkaError) + Send>;
pub type StatisticsHandler = Box<dyn FnMut(&str) + Send>;
pub type LogHandler = Box<dyn FnMut(&LogMessage) + Send>;

#[derive(Default)]
pub struct Observers {
    pub(crate) assigned: Vec<PartitionsHandler>,
    pub(crate) revoked: Vec<PartitionsHandler>,
    pub(crate) committed: Vec<CommittedHandler>,
    pub(crate) error: Vec<ErrorHandler>,
    pub(crate) statistics: Vec<StatisticsHandler>,
    pub(crate) log: Vec<LogHandler>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("assigned", &self.assigned.len())
            .field("revoked", &self.revoked.len())
            .field("committed", &self.committed.len())
            .field("error", &self.error.len())
            .field("statistics", &self.statistics.len())
            .field("log", &self.log.len())
            .finish()
    }
}

impl Observers {
    /// Apply a rebalance. Without a handler for its direction the
    /// assignment is updated directly.
    pub(crate) fn rebalance(&mut self, membership: &mut Membership, rebalance: &Rebalance) {
        let (handlers, partitions) = match rebalance {
            Rebalance::Assign(partitions) => (&mut self.assigned, partitions),
            Rebalance::Revoke(partitions) => (&mut self.revoked, partitions),
        };
        tracing::info!(
            "Rebalance {} | {} partitions",
            if matches!(rebalance, Rebalance::Assign(_)) {
                "assign"
            } else {
                "revoke"
            },
            partitions.len()
        );

        if handlers.is_empty() {
            let outcome = match rebalance {
                Rebalance::Assign(partitions) => membership.assign_partitions(partitions),
                Rebalance::Revoke(_) => membership.unassign(),
            };
            if let Err(err) = outcome {
                tracing::error!("ERROR: Applying rebalance failed {:?}", err);
                let error = KafkaError::with_reason(KafkaCode::LocalState, err.to_string());
                self.error(&error);
            }
            return;
        }

        for handler in handlers.iter_mut() {
            handler(membership, partitions);
        }
    }

    pub(crate) fn committed(&mut self, committed: &CommittedOffsets) {
        if committed.error.is_error() {
            tracing::warn!("Offset commit failed: {}", committed.error);
        }
        for handler in self.committed.iter_mut() {
            handler(committed);
        }
    }

    pub(crate) fn error(&mut self, error: &KafkaError) {
        if self.error.is_empty() {
            tracing::warn!("Unhandled client error: {}", error);
        }
        for handler in self.error.iter_mut() {
            handler(error);
        }
    }

    pub(crate) fn statistics(&mut self, statistics: &str) {
        for handler in self.statistics.iter_mut() {
            handler(statistics);
        }
    }

    /// Without a log handler, lines go to `tracing`.
    pub(crate) fn log(&mut self, log: &LogMessage) {
        if self.log.is_empty() {
            match log.level {
                SyslogLevel::Emergency
                | SyslogLevel::Alert
                | SyslogLevel::Critical
                | SyslogLevel::Error => {
                    tracing::error!(name = %log.name, facility = %log.facility, "{}", log.message)
                }
                SyslogLevel::Warning => {
                    tracing::warn!(name = %log.name, facility = %log.facility, "{}", log.message)
                }
                SyslogLevel::Notice | SyslogLevel::Info => {
                    tracing::info!(name = %log.name, facility = %log.facility, "{}", log.message)
                }
                SyslogLevel::Debug => {
                    tracing::debug!(name = %log.name, facility = %log.facility, "{}", log.message)
                }
            }
            return;
        }
        for handler in self.log.iter_mut() {
            handler(log);
        }
    }
}
