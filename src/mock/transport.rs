use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::instrument;

use super::state::Shared;
use crate::{
    error::Result,
    topic_partition::{
        TopicPartition, TopicPartitionError, TopicPartitionOffset, TopicPartitionOffsetError,
        TopicPartitionTimestamp,
    },
    transport::{Event, Transport},
    utils,
};

/// Longest single wait, so expired sessions are noticed while blocked.
const MAX_WAIT: Duration = Duration::from_millis(20);

/// A client instance connected to a [`super::MockCluster`].
pub struct MockTransport {
    pub(super) id: u64,
    pub(super) name: String,
    pub(super) shared: Arc<Shared>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Transport for MockTransport {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn poll(&self, timeout: Duration) -> Option<Event> {
        let deadline = utils::deadline(timeout);
        let mut state = self.shared.lock();
        loop {
            if state.expire_sessions() {
                self.shared.changed.notify_all();
            }
            if let Some(event) = state.next_event(self.id) {
                return Some(event);
            }

            let left = utils::remaining(deadline);
            if left.is_zero() {
                return None;
            }
            state = match self.shared.changed.wait_timeout(state, left.min(MAX_WAIT)) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    #[instrument(level = "debug", skip(self))]
    fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.shared.lock().subscribe(self.id, topics)?;
        self.shared.changed.notify_all();
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn unsubscribe(&self) -> Result<()> {
        let mut state = self.shared.lock();
        state.handle(self.id)?;
        state.leave(self.id);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn subscription(&self) -> Vec<String> {
        self.shared
            .lock()
            .handle(self.id)
            .map(|handle| handle.subscription.clone())
            .unwrap_or_default()
    }

    #[instrument(level = "debug", skip(self))]
    fn assign(&self, partitions: &[TopicPartitionOffset]) -> Result<()> {
        self.shared.lock().assign(self.id, partitions)?;
        self.shared.changed.notify_all();
        Ok(())
    }

    fn seek(&self, partition: &TopicPartitionOffset) -> Result<()> {
        self.shared.lock().seek(self.id, partition)?;
        self.shared.changed.notify_all();
        Ok(())
    }

    fn pause(&self, partitions: &[TopicPartition]) -> Vec<TopicPartitionError> {
        self.shared.lock().set_paused(self.id, partitions, true)
    }

    fn resume(&self, partitions: &[TopicPartition]) -> Vec<TopicPartitionError> {
        let outcome = self.shared.lock().set_paused(self.id, partitions, false);
        self.shared.changed.notify_all();
        outcome
    }

    #[instrument(level = "debug", skip(self))]
    fn commit(&self, offsets: &[TopicPartitionOffset]) -> Result<Vec<TopicPartitionOffsetError>> {
        let outcome = self.shared.lock().commit(self.id, offsets);
        self.shared.changed.notify_all();
        outcome
    }

    fn commit_queued(&self, offsets: Vec<TopicPartitionOffset>) {
        if let Err(err) = self.shared.lock().commit(self.id, &offsets) {
            tracing::warn!("Dropping queued commit of {} offsets: {}", offsets.len(), err);
        }
        self.shared.changed.notify_all();
    }

    fn committed(
        &self,
        partitions: &[TopicPartition],
        _timeout: Duration,
    ) -> Result<Vec<TopicPartitionOffsetError>> {
        self.shared.lock().committed(self.id, partitions)
    }

    fn offsets_for_times(
        &self,
        timestamps: &[TopicPartitionTimestamp],
        _timeout: Duration,
    ) -> Result<Vec<TopicPartitionOffsetError>> {
        self.shared.lock().offsets_for_times(self.id, timestamps)
    }

    fn member_id(&self) -> String {
        self.shared
            .lock()
            .handle(self.id)
            .ok()
            .and_then(|handle| handle.member_id.clone())
            .unwrap_or_default()
    }

    #[instrument(level = "debug", skip(self))]
    fn close(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.handle(self.id).is_err() {
            return Ok(());
        }
        state.leave(self.id);
        if let Some(handle) = state.handles.get_mut(&self.id) {
            handle.fetches.clear();
            handle.closed = true;
        }
        self.shared.changed.notify_all();
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        let Some(handle) = state.handles.get_mut(&self.id) else {
            return;
        };
        if handle.member_id.is_some() {
            // stays in the group until its session times out
            handle.alive = false;
            handle.last_seen = Instant::now();
            handle.events.clear();
        } else {
            state.handles.remove(&self.id);
        }
        self.shared.changed.notify_all();
    }
}
