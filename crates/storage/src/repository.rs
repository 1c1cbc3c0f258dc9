// SPDX-License-Identifier: MIT

//! The `Repository` contract: durable storage for task records, execution
//! history, and resource snapshots. The worker pool and queue consume this
//! trait; `toil-storage` ships one implementation ([`crate::InMemoryRepository`])
//! suitable for a single-instance scheduler and for tests. A production
//! deployment plugs in a real backing store (SQL with
//! `SELECT ... FOR UPDATE SKIP LOCKED`, or similar) behind the same trait.

use crate::error::RepositoryError;
use async_trait::async_trait;
use toil_core::{ExecutionHistoryEvent, ResourceRequirements, ResourceSnapshot, Task, TaskId, TaskStatus, WorkerId};

/// Result alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn create(&self, task: Task) -> Result<()>;
    async fn get_by_id(&self, id: &TaskId) -> Result<Option<Task>>;
    async fn update(&self, task: Task) -> Result<()>;
    async fn delete(&self, id: &TaskId) -> Result<()>;

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<()>;
    async fn update_progress(&self, id: &TaskId, progress: f64, message: Option<String>) -> Result<()>;
    async fn update_heartbeat(&self, id: &TaskId) -> Result<()>;
    async fn save_checkpoint(&self, id: &TaskId, checkpoint: Vec<u8>) -> Result<()>;
    /// Records the executor's captured final output text on `Task::output`.
    async fn save_output(&self, id: &TaskId, output: String) -> Result<()>;

    async fn get_by_status(&self, status: TaskStatus, limit: usize, offset: usize) -> Result<Vec<Task>>;
    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>>;
    /// Tasks whose `last_heartbeat` is older than `threshold` seconds ago,
    /// or that have never heartbeated since `started_at`. Used by the
    /// coarse stuck-scan loop to cut candidates before running `IsStuck`.
    async fn get_stale_tasks(&self, threshold_secs: u64) -> Result<Vec<Task>>;
    async fn get_by_worker_id(&self, worker_id: &WorkerId) -> Result<Vec<Task>>;
    async fn count_by_status(&self, status: TaskStatus) -> Result<u64>;

    /// Atomically select the highest-priority eligible PENDING task and
    /// transition it to RUNNING bound to `worker_id`. The only permitted
    /// mechanism by which a task enters RUNNING. Returns `None` when no
    /// task is eligible. Must be a single round-trip under concurrent
    /// contention: a naive read-then-write is INCORRECT.
    async fn claim_one(&self, worker_id: &WorkerId, budget: ResourceRequirements) -> Result<Option<Task>>;

    async fn save_resource_snapshot(&self, snapshot: ResourceSnapshot) -> Result<()>;
    async fn get_resource_snapshots(&self, task_id: &TaskId, limit: usize) -> Result<Vec<ResourceSnapshot>>;

    async fn log_event(&self, event: ExecutionHistoryEvent) -> Result<()>;
    async fn get_task_history(&self, task_id: &TaskId) -> Result<Vec<ExecutionHistoryEvent>>;

    /// Transition RUNNING -> PENDING, clear worker_id/started_at/last_heartbeat,
    /// increment retry_count, set scheduled_at = now + delay.
    async fn requeue(&self, id: &TaskId, delay_secs: u64) -> Result<()>;
    /// Transition to DEAD_LETTER, recording `reason` into `last_error`.
    async fn move_to_dead_letter(&self, id: &TaskId, reason: String) -> Result<()>;

    /// Cached depth-by-priority histogram. Implementations are free to
    /// cache this for a short TTL; any mutating operation must invalidate
    /// the cache (enqueue/claim/requeue/dead-letter).
    async fn depth_by_priority(&self) -> Result<Vec<(toil_core::Priority, u64)>>;
}
