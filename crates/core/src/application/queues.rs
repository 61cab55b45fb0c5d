// Priority queues - three FIFO lists of job references

use std::sync::Arc;

use crate::domain::Priority;
use crate::error::Result;
use crate::store::RecordStore;

/// FIFO queues of job ids, one per priority band.
///
/// Submitters only ever append; the scheduler's snapshot-sort-drain-walk
/// cycle is the only reordering path.
pub struct PriorityQueues {
    records: Arc<RecordStore>,
}

impl PriorityQueues {
    pub fn new(records: Arc<RecordStore>) -> Self {
        Self { records }
    }

    /// Append a job reference at the tail
    pub async fn push(&self, priority: Priority, job_id: &str) -> Result<()> {
        self.records.queue_push(priority, job_id).await
    }

    pub async fn pop(&self, priority: Priority) -> Result<Option<String>> {
        self.records.queue_pop(priority).await
    }

    pub async fn len(&self, priority: Priority) -> Result<i64> {
        self.records.queue_len(priority).await
    }

    pub async fn snapshot(&self, priority: Priority) -> Result<Vec<String>> {
        self.records.queue_snapshot(priority).await
    }

    /// Pop to empty. Scheduler-only; every drained entry must be either
    /// dispatched or re-appended before the tick ends.
    pub async fn drain(&self, priority: Priority) -> Result<Vec<String>> {
        let mut drained = Vec::new();
        while let Some(id) = self.pop(priority).await? {
            drained.push(id);
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::port::state_store::memory::MemoryStateStore;
    use crate::port::time_provider::mocks::MockTimeProvider;

    fn queues() -> PriorityQueues {
        let time = Arc::new(MockTimeProvider::new(0));
        let store = Arc::new(MemoryStateStore::new(time));
        PriorityQueues::new(Arc::new(RecordStore::new(
            store,
            &OrchestratorConfig::default(),
        )))
    }

    #[tokio::test]
    async fn bands_are_independent_fifo_lists() {
        let q = queues();
        q.push(Priority::High, "h-1").await.unwrap();
        q.push(Priority::Low, "l-1").await.unwrap();
        q.push(Priority::High, "h-2").await.unwrap();

        assert_eq!(q.len(Priority::High).await.unwrap(), 2);
        assert_eq!(q.len(Priority::Medium).await.unwrap(), 0);
        assert_eq!(q.pop(Priority::High).await.unwrap().as_deref(), Some("h-1"));
        assert_eq!(q.pop(Priority::Low).await.unwrap().as_deref(), Some("l-1"));
    }

    #[tokio::test]
    async fn drain_empties_the_band_in_order() {
        let q = queues();
        for id in ["a", "b", "c"] {
            q.push(Priority::Medium, id).await.unwrap();
        }
        let drained = q.drain(Priority::Medium).await.unwrap();
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert_eq!(q.len(Priority::Medium).await.unwrap(), 0);
    }
}
