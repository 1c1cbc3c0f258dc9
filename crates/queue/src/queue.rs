// SPDX-License-Identifier: MIT

//! The Task Queue: a thin, cached wrapper over any [`Repository`].
//!
//! Every mutating operation invalidates the depth-by-priority cache; the
//! read path is otherwise a direct pass-through, since atomicity already
//! lives in the repository's `claim_one`.

use crate::cache::TtlCache;
use crate::error::QueueError;
use std::sync::Arc;
use std::time::Duration;
use toil_core::{Clock, Priority, ResourceRequirements, SystemClock, Task, TaskConfig, TaskId, TaskStatus, WorkerId};
use toil_storage::Repository;

/// Default TTL for the depth-by-priority histogram (spec default 5s).
const DEPTH_CACHE_TTL: Duration = Duration::from_secs(5);

pub struct TaskQueue<R: Repository, C: Clock = SystemClock> {
    repository: Arc<R>,
    clock: C,
    depth_cache: TtlCache<Vec<(Priority, u64)>>,
}

impl<R: Repository> TaskQueue<R, SystemClock> {
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_clock(repository, SystemClock)
    }
}

impl<R: Repository, C: Clock> TaskQueue<R, C> {
    pub fn with_clock(repository: Arc<R>, clock: C) -> Self {
        Self { repository, clock, depth_cache: TtlCache::new(DEPTH_CACHE_TTL) }
    }

    /// Stamps defaults (status=PENDING, scheduled_at=now if unset) via
    /// [`Task::new`] and persists. Fails with `Invalid` when `task_type`
    /// is empty — the Rust analogue of "task is nil".
    pub async fn enqueue(&self, config: TaskConfig) -> Result<Task, QueueError> {
        if config.task_type.trim().is_empty() {
            return Err(QueueError::Invalid("task_type must not be empty".into()));
        }
        let task = Task::new(config, self.clock.now());
        self.repository.create(task.clone()).await?;
        self.depth_cache.invalidate();
        Ok(task)
    }

    pub async fn claim(&self, worker_id: &WorkerId, budget: ResourceRequirements) -> Result<Option<Task>, QueueError> {
        let claimed = self.repository.claim_one(worker_id, budget).await?;
        if claimed.is_some() {
            self.depth_cache.invalidate();
        }
        Ok(claimed)
    }

    /// Up to `n` PENDING tasks ordered as `claim` would pick them, without
    /// mutating them.
    pub async fn peek(&self, n: usize) -> Result<Vec<Task>, QueueError> {
        Ok(self.repository.get_pending_tasks(n).await?)
    }

    pub async fn requeue(&self, task_id: &TaskId, delay_secs: u64) -> Result<(), QueueError> {
        self.repository.requeue(task_id, delay_secs).await?;
        self.depth_cache.invalidate();
        Ok(())
    }

    pub async fn dead_letter(&self, task_id: &TaskId, reason: impl Into<String>) -> Result<(), QueueError> {
        self.repository.move_to_dead_letter(task_id, reason.into()).await?;
        self.depth_cache.invalidate();
        Ok(())
    }

    pub async fn pending_count(&self) -> Result<u64, QueueError> {
        Ok(self.repository.count_by_status(TaskStatus::Pending).await?)
    }

    pub async fn running_count(&self) -> Result<u64, QueueError> {
        Ok(self.repository.count_by_status(TaskStatus::Running).await?)
    }

    pub async fn depth_by_priority(&self) -> Result<Vec<(Priority, u64)>, QueueError> {
        if let Some(cached) = self.depth_cache.get() {
            return Ok(cached);
        }
        let depth = self.repository.depth_by_priority().await?;
        self.depth_cache.set(depth.clone());
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toil_core::FakeClock;
    use toil_storage::InMemoryRepository;

    fn queue() -> TaskQueue<InMemoryRepository<FakeClock>, FakeClock> {
        let clock = FakeClock::new();
        TaskQueue::with_clock(Arc::new(InMemoryRepository::with_clock(clock.clone())), clock)
    }

    #[tokio::test]
    async fn enqueue_rejects_empty_task_type() {
        let queue = queue();
        let err = queue.enqueue(TaskConfig::new("")).await.unwrap_err();
        assert!(matches!(err, QueueError::Invalid(_)));
    }

    #[tokio::test]
    async fn enqueue_then_claim_round_trips() {
        let queue = queue();
        let enqueued = queue.enqueue(TaskConfig::new("command")).await.unwrap();
        let claimed = queue.claim(&WorkerId::new("w1"), ResourceRequirements::default()).await.unwrap().unwrap();
        assert_eq!(claimed.id, enqueued.id);
        assert_eq!(claimed.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn peek_orders_by_priority_then_fifo() {
        let queue = queue();
        queue.enqueue(TaskConfig::new("low").priority(Priority::Low)).await.unwrap();
        let critical = queue.enqueue(TaskConfig::new("critical").priority(Priority::Critical)).await.unwrap();
        let peeked = queue.peek(10).await.unwrap();
        assert_eq!(peeked.first().unwrap().id, critical.id);
    }

    #[tokio::test]
    async fn depth_by_priority_reflects_enqueue_through_invalidation() {
        let queue = queue();
        queue.enqueue(TaskConfig::new("a")).await.unwrap();
        let first = queue.depth_by_priority().await.unwrap();
        queue.enqueue(TaskConfig::new("b")).await.unwrap();
        let after = queue.depth_by_priority().await.unwrap();
        assert_ne!(first, after);
    }

    #[tokio::test]
    async fn dead_letter_transitions_status_and_records_reason() {
        let queue = queue();
        let task = queue.enqueue(TaskConfig::new("doomed")).await.unwrap();
        queue.dead_letter(&task.id, "exhausted retries").await.unwrap();
        let stored = queue.repository.get_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::DeadLetter);
        assert_eq!(stored.last_error.as_deref(), Some("exhausted retries"));
    }
}
