// SPDX-License-Identifier: MIT

//! In-memory [`Repository`] implementation. Suitable for a single-instance
//! scheduler and for tests: all mutation happens under one
//! `parking_lot::Mutex`, which is what makes [`Repository::claim_one`]
//! atomic against concurrent workers — the documented alternative to a SQL
//! `SELECT ... FOR UPDATE SKIP LOCKED`.

use crate::error::RepositoryError;
use crate::repository::{Repository, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use toil_core::{
    Clock, ExecutionHistoryEvent, Priority, ResourceRequirements, ResourceSnapshot, SystemClock,
    Task, TaskId, TaskStatus, WorkerId,
};

/// Bound on the in-memory resource-snapshot ring buffer per task, mirroring
/// the resource monitor's own in-process ring buffer size.
const MAX_SNAPSHOTS_PER_TASK: usize = 64;

struct Inner {
    tasks: HashMap<TaskId, Task>,
    snapshots: HashMap<TaskId, Vec<ResourceSnapshot>>,
    history: HashMap<TaskId, Vec<ExecutionHistoryEvent>>,
}

impl Inner {
    fn new() -> Self {
        Self { tasks: HashMap::new(), snapshots: HashMap::new(), history: HashMap::new() }
    }
}

pub struct InMemoryRepository<C: Clock = SystemClock> {
    clock: C,
    inner: Mutex<Inner>,
}

impl InMemoryRepository<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryRepository<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryRepository<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock, inner: Mutex::new(Inner::new()) }
    }

    /// Snapshot the full in-memory state for persistence. Resource
    /// snapshots are intentionally excluded — they're a short-lived
    /// diagnostic window, not durable state worth a restart recovering.
    pub fn export_state(&self) -> crate::snapshot_store::RepositoryState {
        let inner = self.inner.lock();
        crate::snapshot_store::RepositoryState {
            tasks: inner.tasks.values().cloned().collect(),
            history: inner.history.values().flatten().cloned().collect(),
        }
    }

    /// Replace the in-memory state with a previously exported snapshot,
    /// used on daemon startup to recover from the last periodic snapshot.
    pub fn restore_state(&self, state: crate::snapshot_store::RepositoryState) {
        let mut inner = self.inner.lock();
        inner.tasks = state.tasks.into_iter().map(|t| (t.id, t)).collect();
        inner.history.clear();
        for event in state.history {
            inner.history.entry(event.task_id).or_default().push(event);
        }
    }
}

#[async_trait]
impl<C: Clock> Repository for InMemoryRepository<C> {
    async fn create(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.tasks.insert(task.id, task);
        Ok(())
    }

    async fn get_by_id(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.inner.lock().tasks.get(id).cloned())
    }

    async fn update(&self, task: Task) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.tasks.insert(task.id, task);
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.tasks.remove(id);
        inner.snapshots.remove(id);
        inner.history.remove(id);
        Ok(())
    }

    async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        task.status = status;
        task.updated_at = now;
        if status.is_terminal() {
            task.completed_at = Some(now);
        }
        Ok(())
    }

    async fn update_progress(&self, id: &TaskId, progress: f64, message: Option<String>) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        task.progress = progress.clamp(0.0, 100.0);
        if message.is_some() {
            task.progress_message = message;
        }
        task.updated_at = now;
        Ok(())
    }

    async fn update_heartbeat(&self, id: &TaskId) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        task.last_heartbeat = Some(now);
        task.updated_at = now;
        Ok(())
    }

    async fn save_checkpoint(&self, id: &TaskId, checkpoint: Vec<u8>) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        task.checkpoint = Some(checkpoint);
        task.updated_at = now;
        Ok(())
    }

    async fn save_output(&self, id: &TaskId, output: String) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        task.output = Some(output);
        task.updated_at = now;
        Ok(())
    }

    async fn get_by_status(&self, status: TaskStatus, limit: usize, offset: usize) -> Result<Vec<Task>> {
        let inner = self.inner.lock();
        let mut matching: Vec<Task> =
            inner.tasks.values().filter(|t| t.status == status).cloned().collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching.into_iter().skip(offset).take(limit.max(1)).collect())
    }

    async fn get_pending_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let mut eligible: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.scheduled_at <= now)
            .cloned()
            .collect();
        eligible.sort_by(|a, b| {
            a.priority.weight().cmp(&b.priority.weight()).then(a.created_at.cmp(&b.created_at)).then(a.id.as_str().cmp(b.id.as_str()))
        });
        eligible.truncate(limit.max(1));
        Ok(eligible)
    }

    async fn get_stale_tasks(&self, threshold_secs: u64) -> Result<Vec<Task>> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let mut stale: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .filter(|t| match t.last_heartbeat {
                Some(hb) => now.duration_since(hb).map(|d| d.as_secs() >= threshold_secs).unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();
        stale.sort_by_key(|t| t.started_at);
        Ok(stale)
    }

    async fn get_by_worker_id(&self, worker_id: &WorkerId) -> Result<Vec<Task>> {
        let inner = self.inner.lock();
        Ok(inner.tasks.values().filter(|t| t.worker_id.as_ref() == Some(worker_id)).cloned().collect())
    }

    async fn count_by_status(&self, status: TaskStatus) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(inner.tasks.values().filter(|t| t.status == status).count() as u64)
    }

    async fn claim_one(&self, worker_id: &WorkerId, budget: ResourceRequirements) -> Result<Option<Task>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let winner_id = {
            let mut eligible: Vec<&Task> = inner
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Pending)
                .filter(|t| t.scheduled_at <= now)
                .filter(|t| budget.cpu_cores == 0.0 || t.required_cpu_cores <= budget.cpu_cores)
                .filter(|t| budget.memory_mb == 0 || t.required_memory_mb <= budget.memory_mb)
                .collect();

            eligible.sort_by(|a, b| {
                a.priority
                    .weight()
                    .cmp(&b.priority.weight())
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.as_str().cmp(b.id.as_str()))
            });

            eligible.first().map(|t| t.id)
        };

        let Some(winner_id) = winner_id else {
            return Ok(None);
        };

        let Some(task) = inner.tasks.get_mut(&winner_id) else {
            return Ok(None);
        };
        task.status = TaskStatus::Running;
        task.worker_id = Some(worker_id.clone());
        task.started_at = Some(now);
        task.last_heartbeat = Some(now);
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn save_resource_snapshot(&self, snapshot: ResourceSnapshot) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner.snapshots.entry(snapshot.task_id).or_default();
        entry.push(snapshot);
        if entry.len() > MAX_SNAPSHOTS_PER_TASK {
            let overflow = entry.len() - MAX_SNAPSHOTS_PER_TASK;
            entry.drain(0..overflow);
        }
        Ok(())
    }

    async fn get_resource_snapshots(&self, task_id: &TaskId, limit: usize) -> Result<Vec<ResourceSnapshot>> {
        let inner = self.inner.lock();
        let Some(entries) = inner.snapshots.get(task_id) else {
            return Ok(Vec::new());
        };
        // Most-recent-first, as the stuck detector expects its input window.
        Ok(entries.iter().rev().take(limit.max(1)).cloned().collect())
    }

    async fn log_event(&self, event: ExecutionHistoryEvent) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.history.entry(event.task_id).or_default().push(event);
        Ok(())
    }

    async fn get_task_history(&self, task_id: &TaskId) -> Result<Vec<ExecutionHistoryEvent>> {
        let inner = self.inner.lock();
        Ok(inner.history.get(task_id).cloned().unwrap_or_default())
    }

    async fn requeue(&self, id: &TaskId, delay_secs: u64) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        task.status = TaskStatus::Pending;
        task.worker_id = None;
        task.started_at = None;
        task.last_heartbeat = None;
        task.retry_count += 1;
        task.scheduled_at = now + std::time::Duration::from_secs(delay_secs);
        task.updated_at = now;
        Ok(())
    }

    async fn move_to_dead_letter(&self, id: &TaskId, reason: String) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(id).ok_or(RepositoryError::NotFound(*id))?;
        task.status = TaskStatus::DeadLetter;
        task.last_error = Some(reason);
        task.updated_at = now;
        task.completed_at = Some(now);
        Ok(())
    }

    async fn depth_by_priority(&self) -> Result<Vec<(Priority, u64)>> {
        let inner = self.inner.lock();
        let mut counts: HashMap<Priority, u64> = HashMap::new();
        for task in inner.tasks.values().filter(|t| t.status == TaskStatus::Pending) {
            *counts.entry(task.priority).or_insert(0) += 1;
        }
        let mut out: Vec<(Priority, u64)> = counts.into_iter().collect();
        out.sort_by_key(|(p, _)| p.weight());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toil_core::{FakeClock, TaskConfig};

    fn repo() -> InMemoryRepository<FakeClock> {
        InMemoryRepository::with_clock(FakeClock::new())
    }

    #[tokio::test]
    async fn claim_returns_none_when_empty() {
        let repo = repo();
        let result = repo.claim_one(&WorkerId::new("w1"), ResourceRequirements::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fifo_within_priority() {
        let clock = FakeClock::new();
        let repo = InMemoryRepository::with_clock(clock.clone());

        let mut ids = Vec::new();
        for _ in 0..3 {
            let task = Task::new(TaskConfig::new("noop"), clock.now());
            ids.push(task.id);
            repo.create(task).await.unwrap();
            clock.advance(Duration::from_secs(1));
        }

        let worker = WorkerId::new("w1");
        for expected in ids {
            let claimed = repo.claim_one(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
            assert_eq!(claimed.id, expected);
        }
        assert!(repo.claim_one(&worker, ResourceRequirements::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn priority_preempts_fifo_order() {
        let clock = FakeClock::new();
        let repo = InMemoryRepository::with_clock(clock.clone());

        let low = Task::new(TaskConfig::new("noop").priority(Priority::Low), clock.now());
        let low_id = low.id;
        repo.create(low).await.unwrap();
        clock.advance(Duration::from_secs(1));

        let high = Task::new(TaskConfig::new("noop").priority(Priority::High), clock.now());
        let high_id = high.id;
        repo.create(high).await.unwrap();

        let worker = WorkerId::new("w1");
        let first = repo.claim_one(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
        assert_eq!(first.id, high_id);
        let second = repo.claim_one(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
        assert_eq!(second.id, low_id);
    }

    #[tokio::test]
    async fn resource_filter_excludes_oversized_requests() {
        let clock = FakeClock::new();
        let repo = InMemoryRepository::with_clock(clock.clone());
        let task = Task::new(TaskConfig::new("noop").required_cpu_cores(4.0), clock.now());
        repo.create(task).await.unwrap();

        let worker = WorkerId::new("w1");
        let small_budget = ResourceRequirements { cpu_cores: 2.0, memory_mb: 0 };
        assert!(repo.claim_one(&worker, small_budget).await.unwrap().is_none());

        let big_budget = ResourceRequirements { cpu_cores: 8.0, memory_mb: 0 };
        assert!(repo.claim_one(&worker, big_budget).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn requeue_then_reclaim_increments_retry_count() {
        let clock = FakeClock::new();
        let repo = InMemoryRepository::with_clock(clock.clone());
        let task = Task::new(TaskConfig::new("noop"), clock.now());
        let id = task.id;
        repo.create(task).await.unwrap();

        let worker = WorkerId::new("w1");
        let claimed = repo.claim_one(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
        assert_eq!(claimed.id, id);

        repo.requeue(&id, 0).await.unwrap();
        let reclaimed = repo.claim_one(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.retry_count, 1);
    }

    #[tokio::test]
    async fn concurrent_claims_never_double_dispatch() {
        use std::sync::Arc;

        let clock = FakeClock::new();
        let repo = Arc::new(InMemoryRepository::with_clock(clock.clone()));
        for _ in 0..20 {
            repo.create(Task::new(TaskConfig::new("noop"), clock.now())).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.claim_one(&WorkerId::new(format!("w{i}")), ResourceRequirements::default()).await.unwrap()
            }));
        }

        let mut claimed_ids = std::collections::HashSet::new();
        for handle in handles {
            if let Some(task) = handle.await.unwrap() {
                assert!(claimed_ids.insert(task.id), "task claimed twice: {}", task.id);
            }
        }
        assert_eq!(claimed_ids.len(), 20);
    }
}
