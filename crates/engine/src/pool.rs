// SPDX-License-Identifier: MIT

//! The Worker Pool: owns worker lifecycle, dispatches claimed tasks to
//! registered executors, drives heartbeats, stuck scanning, and autoscaling.

use crate::error::{EngineError, ExecutorError};
use crate::events::Notifier;
use crate::executor::{ExecContext, ExecutorRegistry};
use crate::reporter::ProgressReporter;
use crate::worker::{WorkerStats, WorkerState};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use toil_core::{EventType, ExecutionHistoryEvent, ResourceRequirements, Task, TaskId, TaskStatus, WorkerId};
use toil_queue::TaskQueue;
use toil_resource::ResourceMonitor;
use toil_storage::Repository;
use toil_stuck::ThresholdRegistry;

/// Autoscaling and loop cadence knobs. All fields have the spec's defaults.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_interval: Duration,
    pub worker_idle_timeout: Duration,
    pub queue_poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub resource_check_interval: Duration,
    pub max_cpu_percent: f64,
    pub max_memory_percent: f64,
    pub graceful_shutdown_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            min_workers: 1,
            max_workers: cores * 2,
            scale_up_threshold: 0.7,
            scale_down_threshold: 0.3,
            scale_interval: Duration::from_secs(30),
            worker_idle_timeout: Duration::from_secs(5 * 60),
            queue_poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
            resource_check_interval: Duration::from_secs(5),
            max_cpu_percent: 80.0,
            max_memory_percent: 80.0,
            graceful_shutdown_time: Duration::from_secs(30),
        }
    }
}

struct WorkerHandle {
    state: RwLock<WorkerState>,
    stats: Mutex<WorkerStats>,
    cancel: CancellationToken,
}

/// Coordinates a fleet of `tokio` worker loops over a shared [`Repository`]
/// and [`ResourceMonitor`]. `R` and `M` are fixed at construction, matching
/// a single backing store and monitor per pool.
pub struct WorkerPool<R: Repository, M: ResourceMonitor> {
    queue: Arc<TaskQueue<R>>,
    repository: Arc<R>,
    resource_monitor: Arc<M>,
    executors: Arc<ExecutorRegistry>,
    notifier: Arc<dyn Notifier>,
    threshold_registry: Arc<ThresholdRegistry>,
    config: PoolConfig,
    workers: Arc<RwLock<HashMap<WorkerId, Arc<WorkerHandle>>>>,
    running: Arc<RwLock<HashMap<TaskId, CancellationToken>>>,
    scaling_guard: Arc<AtomicBool>,
    shutdown: CancellationToken,
    join_set: Mutex<JoinSet<()>>,
    worker_count: Arc<AtomicUsize>,
}

impl<R: Repository, M: ResourceMonitor> WorkerPool<R, M> {
    pub fn new(repository: Arc<R>, resource_monitor: Arc<M>, notifier: Arc<dyn Notifier>, config: PoolConfig) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new(repository.clone())),
            repository,
            resource_monitor,
            executors: Arc::new(ExecutorRegistry::new()),
            notifier,
            threshold_registry: Arc::new(ThresholdRegistry::new()),
            config,
            workers: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(RwLock::new(HashMap::new())),
            scaling_guard: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            join_set: Mutex::new(JoinSet::new()),
            worker_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn register_executor(&self, task_type: impl Into<String>, executor: Arc<dyn crate::executor::Executor>) {
        self.executors.register(task_type, executor);
    }

    pub fn threshold_registry(&self) -> Arc<ThresholdRegistry> {
        self.threshold_registry.clone()
    }

    pub fn repository(&self) -> Arc<R> {
        self.repository.clone()
    }

    pub fn queue(&self) -> Arc<TaskQueue<R>> {
        self.queue.clone()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Spawn `min_workers` workers plus the scaling, stuck-detection, and
    /// heartbeat background loops.
    pub fn start(self: &Arc<Self>) {
        for _ in 0..self.config.min_workers {
            self.spawn_worker();
        }
        self.spawn_background_loop(self.config.scale_interval, {
            let pool = self.clone();
            move || {
                let pool = pool.clone();
                async move { pool.run_scaling_pass().await }
            }
        });
        self.spawn_background_loop(Duration::from_secs(30), {
            let pool = self.clone();
            move || {
                let pool = pool.clone();
                async move { pool.run_stuck_scan().await }
            }
        });
        self.spawn_background_loop(self.config.heartbeat_interval, {
            let pool = self.clone();
            move || {
                let pool = pool.clone();
                async move { pool.run_heartbeat_pass().await }
            }
        });
    }

    fn spawn_background_loop<F, Fut>(self: &Arc<Self>, interval: Duration, mut make_future: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.join_set.lock().spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => make_future().await,
                }
            }
        });
    }

    fn spawn_worker(self: &Arc<Self>) -> WorkerId {
        let worker_id = WorkerId::new(format!("wrk-{}", nanoid::nanoid!(12)));
        let handle = Arc::new(WorkerHandle {
            state: RwLock::new(WorkerState::Idle),
            stats: Mutex::new(WorkerStats::new(SystemTime::now())),
            cancel: self.shutdown.child_token(),
        });
        self.workers.write().insert(worker_id.clone(), handle);
        self.worker_count.fetch_add(1, Ordering::SeqCst);

        let pool = self.clone();
        let id = worker_id.clone();
        self.join_set.lock().spawn(async move {
            pool.worker_loop(id).await;
        });
        worker_id
    }

    async fn worker_loop(self: Arc<Self>, worker_id: WorkerId) {
        loop {
            let Some(handle) = self.workers.read().get(&worker_id).cloned() else { break };
            if handle.cancel.is_cancelled() {
                *handle.state.write() = WorkerState::Stopped;
                break;
            }

            let worker_count = self.worker_count().max(1);
            let system = self.resource_monitor.system_resources();
            let budget = ResourceRequirements {
                cpu_cores: system.available_cpu_cores as f64 / worker_count as f64,
                memory_mb: system.available_memory_mb / worker_count as u64,
            };

            match self.queue.claim(&worker_id, budget).await {
                Ok(Some(task)) => {
                    *handle.state.write() = WorkerState::Busy;
                    {
                        let mut stats = handle.stats.lock();
                        stats.last_activity = SystemTime::now();
                        stats.current_task = Some(task.id);
                    }
                    self.execute_task(&worker_id, &handle, task).await;
                    *handle.state.write() = WorkerState::Idle;
                    handle.stats.lock().current_task = None;
                }
                Ok(None) => {
                    tokio::time::sleep(self.config.queue_poll_interval).await;
                    if self.should_self_terminate(&handle) {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(worker_id = %worker_id, error = %err, "claim failed, backing off");
                    tokio::time::sleep(self.config.queue_poll_interval).await;
                }
            }
        }
        self.workers.write().remove(&worker_id);
        self.worker_count.fetch_sub(1, Ordering::SeqCst);
    }

    fn should_self_terminate(&self, handle: &WorkerHandle) -> bool {
        let idle_for = handle.stats.lock().last_activity.elapsed().unwrap_or_default();
        idle_for > self.config.worker_idle_timeout && self.worker_count() > self.config.min_workers
    }

    async fn execute_task(&self, worker_id: &WorkerId, handle: &WorkerHandle, task: Task) {
        let Some(executor) = self.executors.get(&task.task_type) else {
            self.handle_task_error(&task, ExecutorError::Permanent("no executor registered".to_string())).await;
            return;
        };

        let monitoring = task.process_pid.is_some();
        if let Some(pid) = task.process_pid {
            if let Err(err) = self.resource_monitor.start_monitoring(task.id, pid, self.config.resource_check_interval).await {
                tracing::warn!(task_id = %task.id, error = %err, "failed to start resource monitoring");
            }
        }

        let reporter = ProgressReporter::new(task.id, worker_id.clone(), self.repository.clone(), self.notifier.clone());
        let cancellation = handle.cancel.child_token();
        let ctx = ExecContext { task_id: task.id, worker_id: worker_id.clone(), cancellation: cancellation.clone() };
        self.running.write().insert(task.id, cancellation.clone());

        self.emit(self.lifecycle_event(&task, EventType::Started, worker_id)).await;

        let start = std::time::Instant::now();
        let outcome = if task.config.endless {
            executor.execute(ctx, &task, &reporter).await
        } else {
            let timeout = Duration::from_secs(task.config.timeout_seconds);
            match tokio::time::timeout(timeout, executor.execute(ctx, &task, &reporter)).await {
                Ok(result) => result,
                Err(_) => {
                    cancellation.cancel();
                    Err(ExecutorError::DeadlineExceeded)
                }
            }
        };
        let duration = start.elapsed();
        self.running.write().remove(&task.id);

        if monitoring {
            self.resource_monitor.stop_monitoring(task.id).await;
        }

        match outcome {
            Ok(()) => self.handle_task_success(&task, worker_id, handle, duration).await,
            Err(ExecutorError::Cancelled) => self.handle_task_cancelled(&task).await,
            Err(err) => self.handle_task_error(&task, err).await,
        }
    }

    /// Request cancellation of a currently-running task. Returns `true` if
    /// a running task was found and signalled; the task still transitions
    /// to CANCELLED asynchronously once the executor observes the signal
    /// and returns `ExecutorError::Cancelled`.
    pub fn cancel_task(&self, task_id: &TaskId) -> bool {
        if let Some(token) = self.running.read().get(task_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    fn lifecycle_event(&self, task: &Task, event_type: EventType, worker_id: &WorkerId) -> ExecutionHistoryEvent {
        ExecutionHistoryEvent::new(task.id, event_type, SystemTime::now()).with_worker(worker_id.clone())
    }

    /// Appends a lifecycle event to the durable per-task history, then
    /// publishes it to the (transient, best-effort) event bus. The history
    /// write is the one `GetTaskHistory` callers rely on; notifier delivery
    /// is never guaranteed.
    async fn emit(&self, event: ExecutionHistoryEvent) {
        if let Err(err) = self.repository.log_event(event.clone()).await {
            tracing::warn!(task_id = %event.task_id, error = %err, "failed to persist execution history event");
        }
        crate::events::publish_routed(self.notifier.as_ref(), event).await;
    }

    async fn handle_task_success(&self, task: &Task, worker_id: &WorkerId, handle: &WorkerHandle, duration: Duration) {
        if let Err(err) = self.repository.update_progress(&task.id, 100.0, None).await {
            tracing::warn!(task_id = %task.id, error = %err, "failed to persist completion progress");
        }
        if let Err(err) = self.repository.update_status(&task.id, TaskStatus::Completed).await {
            tracing::warn!(task_id = %task.id, error = %err, "failed to persist completed status");
        }
        self.emit(self.lifecycle_event(task, EventType::Completed, worker_id).with_data("duration_ms", duration.as_millis() as u64)).await;
        let mut stats = handle.stats.lock();
        stats.tasks_completed += 1;
        stats.total_duration += duration;
        stats.last_activity = SystemTime::now();
    }

    async fn handle_task_cancelled(&self, task: &Task) {
        if let Err(err) = self.repository.update_status(&task.id, TaskStatus::Cancelled).await {
            tracing::warn!(task_id = %task.id, error = %err, "failed to persist cancelled status");
        }
        self.emit(ExecutionHistoryEvent::new(task.id, EventType::Cancelled, SystemTime::now())).await;
    }

    async fn handle_task_error(&self, task: &Task, err: ExecutorError) {
        tracing::warn!(task_id = %task.id, error = %err, "task execution failed");

        let retryable = err.is_retryable() && task.retry_count < task.max_retries;
        if retryable {
            self.emit(ExecutionHistoryEvent::new(task.id, EventType::Failed, SystemTime::now()).with_data("error", err.to_string())).await;
            if let Err(requeue_err) = self.queue.requeue(&task.id, task.retry_delay_seconds).await {
                tracing::warn!(task_id = %task.id, error = %requeue_err, "requeue failed");
            }
            self.emit(ExecutionHistoryEvent::new(task.id, EventType::Retrying, SystemTime::now()).with_data("error", err.to_string())).await;
        } else {
            if let Err(status_err) = self.repository.update_status(&task.id, TaskStatus::Failed).await {
                tracing::warn!(task_id = %task.id, error = %status_err, "failed to persist failed status");
            }
            self.emit(ExecutionHistoryEvent::new(task.id, EventType::Failed, SystemTime::now()).with_data("error", err.to_string())).await;
            if let Err(dead_letter_err) = self.queue.dead_letter(&task.id, err.to_string()).await {
                tracing::warn!(task_id = %task.id, error = %dead_letter_err, "dead-letter transition failed");
            }
            self.emit(ExecutionHistoryEvent::new(task.id, EventType::DeadLetter, SystemTime::now())).await;
        }
    }

    async fn run_scaling_pass(self: Arc<Self>) {
        if self.scaling_guard.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        let _guard = ScalingGuard(&self.scaling_guard);

        let system = self.resource_monitor.system_resources();
        let worker_count = self.worker_count();
        let pending = self.queue.pending_count().await.unwrap_or(0);
        let avg_load = (system.cpu_load_percent + system.memory_used_percent) / 200.0;
        let queue_pressure = pending as f64 / (worker_count + 1) as f64;

        if avg_load < self.config.scale_up_threshold
            && queue_pressure > 2.0
            && worker_count < self.config.max_workers
            && system.cpu_load_percent < self.config.max_cpu_percent
            && system.memory_used_percent < self.config.max_memory_percent
        {
            let to_add = (self.config.max_workers - worker_count).min(queue_pressure.floor() as usize).min(3);
            for _ in 0..to_add {
                self.spawn_worker();
            }
        }
    }

    async fn run_stuck_scan(self: Arc<Self>) {
        const COARSE_THRESHOLD_SECS: u64 = 30;
        let stale = match self.repository.get_stale_tasks(COARSE_THRESHOLD_SECS).await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::warn!(error = %err, "stuck scan: failed to load stale tasks");
                return;
            }
        };

        for task in stale {
            let snapshots = match self.repository.get_resource_snapshots(&task.id, 8).await {
                Ok(snapshots) => snapshots,
                Err(_) => Vec::new(),
            };
            let verdict = toil_stuck::is_stuck(Some(&task), &snapshots, &self.threshold_registry, SystemTime::now());
            if verdict.stuck {
                if let Err(err) = self.repository.update_status(&task.id, TaskStatus::Stuck).await {
                    tracing::warn!(task_id = %task.id, error = %err, "failed to persist stuck status");
                    continue;
                }
                let reason = verdict.reason.unwrap_or_default();
                self.emit(ExecutionHistoryEvent::new(task.id, EventType::Stuck, SystemTime::now()).with_data("reason", reason)).await;
            }
        }
    }

    async fn run_heartbeat_pass(self: Arc<Self>) {
        let busy_tasks: Vec<TaskId> = self
            .workers
            .read()
            .values()
            .filter(|handle| *handle.state.read() == WorkerState::Busy)
            .filter_map(|handle| handle.stats.lock().current_task)
            .collect();
        for task_id in busy_tasks {
            if let Err(err) = self.repository.update_heartbeat(&task_id).await {
                tracing::warn!(task_id = %task_id, error = %err, "scheduler heartbeat failed");
            }
        }
    }

    /// Cancel the shutdown token, signal every worker, and wait for the
    /// pool's background tasks to drain or `grace` to elapse, whichever
    /// comes first.
    pub async fn stop(&self, grace: Duration) {
        self.shutdown.cancel();
        // Swap out the JoinSet so the lock is never held across an await point.
        let mut join_set = std::mem::replace(&mut *self.join_set.lock(), JoinSet::new());
        let drain = async {
            while join_set.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            join_set.abort_all();
        }
    }

    pub async fn wait_for_completion(&self, task_id: &TaskId, timeout: Duration) -> Result<Task, EngineError> {
        let deadline = SystemTime::now() + timeout;
        let mut backoff = Duration::from_millis(100);
        loop {
            let task = self.repository.get_by_id(task_id).await?;
            if let Some(task) = task {
                if task.status.is_terminal() {
                    return Ok(task);
                }
            }
            if SystemTime::now() >= deadline {
                return Err(EngineError::WaitTimeout);
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(2));
        }
    }

    pub async fn wait_for_multiple(&self, task_ids: &[TaskId], timeout: Duration) -> HashMap<TaskId, Result<Task, EngineError>> {
        let mut results = HashMap::new();
        for task_id in task_ids {
            results.insert(*task_id, self.wait_for_completion(task_id, timeout).await);
        }
        results
    }
}

struct ScalingGuard<'a>(&'a AtomicBool);

impl Drop for ScalingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
