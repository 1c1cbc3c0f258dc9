// SPDX-License-Identifier: MIT

//! End-to-end scenarios and quantified invariants for the task execution
//! engine: queue ordering, retry/dead-letter handling, stuck detection,
//! autoscaling, and graceful shutdown, exercised across the real crates
//! rather than any one crate's unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use toil_core::{
    FakeClock, Priority, ResourceRequirements, ResourceSnapshot, TaskConfig, TaskId, TaskStatus, WorkerId,
};
use toil_engine::{ExecContext, Executor, ExecutorError, NullNotifier, PoolConfig, ProgressReporter, WorkerPool};
use toil_queue::TaskQueue;
use toil_resource::{ResourceError, ResourceMonitor, SystemResources};
use toil_storage::{InMemoryRepository, Repository};

// ---------------------------------------------------------------------
// Shared fixtures
// ---------------------------------------------------------------------

fn fake_repo_and_queue() -> (Arc<InMemoryRepository<FakeClock>>, Arc<TaskQueue<InMemoryRepository<FakeClock>, FakeClock>>, FakeClock) {
    let clock = FakeClock::new();
    let repository = Arc::new(InMemoryRepository::with_clock(clock.clone()));
    let queue = Arc::new(TaskQueue::with_clock(repository.clone(), clock.clone()));
    (repository, queue, clock)
}

fn fast_pool_config() -> PoolConfig {
    PoolConfig {
        min_workers: 1,
        max_workers: 8,
        scale_interval: Duration::from_millis(25),
        worker_idle_timeout: Duration::from_secs(60),
        queue_poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(50),
        resource_check_interval: Duration::from_secs(5),
        ..PoolConfig::default()
    }
}

struct FakeResourceMonitor {
    cpu_load_percent: Mutex<f64>,
    memory_used_percent: Mutex<f64>,
}

impl FakeResourceMonitor {
    fn new(cpu_load_percent: f64, memory_used_percent: f64) -> Self {
        Self { cpu_load_percent: Mutex::new(cpu_load_percent), memory_used_percent: Mutex::new(memory_used_percent) }
    }
}

#[async_trait]
impl ResourceMonitor for FakeResourceMonitor {
    fn system_resources(&self) -> SystemResources {
        SystemResources {
            total_cpu_cores: 8,
            available_cpu_cores: 8,
            total_memory_mb: 16_384,
            available_memory_mb: 16_384,
            cpu_load_percent: *self.cpu_load_percent.lock(),
            memory_used_percent: *self.memory_used_percent.lock(),
            disk_used_percent: 0.0,
            load_average_1: 0.0,
            load_average_5: 0.0,
            load_average_15: 0.0,
        }
    }

    fn process_resources(&self, pid: u32) -> Result<ResourceSnapshot, ResourceError> {
        Err(ResourceError::NotFound(pid))
    }

    async fn start_monitoring(&self, _task_id: TaskId, _pid: u32, _interval: Duration) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn stop_monitoring(&self, _task_id: TaskId) {}

    fn latest_snapshot(&self, task_id: &TaskId) -> Result<ResourceSnapshot, ResourceError> {
        Err(ResourceError::NotMonitoring(*task_id))
    }

    fn snapshot_window(&self, _task_id: &TaskId) -> Vec<ResourceSnapshot> {
        Vec::new()
    }

    fn is_resource_available(&self, _requirements: ResourceRequirements) -> bool {
        true
    }
}

/// Fails transiently on its first `fail_count` invocations, then succeeds.
struct FlakyExecutor {
    attempts: AtomicUsize,
    fail_count: usize,
}

impl FlakyExecutor {
    fn new(fail_count: usize) -> Self {
        Self { attempts: AtomicUsize::new(0), fail_count }
    }
}

#[async_trait]
impl Executor for FlakyExecutor {
    async fn execute(&self, _ctx: ExecContext, _task: &toil_core::Task, _reporter: &ProgressReporter) -> Result<(), ExecutorError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_count {
            Err(ExecutorError::Transient("synthetic failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Always fails transiently with a fixed message.
struct AlwaysFailExecutor;

#[async_trait]
impl Executor for AlwaysFailExecutor {
    async fn execute(&self, _ctx: ExecContext, _task: &toil_core::Task, _reporter: &ProgressReporter) -> Result<(), ExecutorError> {
        Err(ExecutorError::Transient("the executor never succeeds".to_string()))
    }
}

/// Sleeps far past any reasonable grace period and ignores its
/// cancellation token, modeling an executor that cannot be interrupted.
struct SlowExecutor;

#[async_trait]
impl Executor for SlowExecutor {
    async fn execute(&self, _ctx: ExecContext, _task: &toil_core::Task, _reporter: &ProgressReporter) -> Result<(), ExecutorError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

fn snapshot(task_id: TaskId, memory_rss: u64) -> ResourceSnapshot {
    ResourceSnapshot::builder().task_id(task_id).memory_rss_bytes(memory_rss).cpu_percent(5.0).build()
}

// ---------------------------------------------------------------------
// Scenario 1: FIFO within priority
// ---------------------------------------------------------------------

#[tokio::test]
async fn fifo_within_priority() {
    let (_repository, queue, clock) = fake_repo_and_queue();
    let t1 = queue.enqueue(TaskConfig::new("command")).await.unwrap();
    clock.advance(Duration::from_secs(1));
    let t2 = queue.enqueue(TaskConfig::new("command")).await.unwrap();
    clock.advance(Duration::from_secs(1));
    let t3 = queue.enqueue(TaskConfig::new("command")).await.unwrap();

    let worker = WorkerId::new("w1");
    let first = queue.claim(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
    let second = queue.claim(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
    let third = queue.claim(&worker, ResourceRequirements::default()).await.unwrap().unwrap();

    assert_eq!([first.id, second.id, third.id], [t1.id, t2.id, t3.id]);
    assert!([first.status, second.status, third.status].iter().all(|s| *s == TaskStatus::Running));
}

// ---------------------------------------------------------------------
// Scenario 2: priority preempts FIFO order
// ---------------------------------------------------------------------

#[tokio::test]
async fn priority_preempts_fifo_order() {
    let (_repository, queue, clock) = fake_repo_and_queue();
    let low = queue.enqueue(TaskConfig::new("command").priority(Priority::Low)).await.unwrap();
    clock.advance(Duration::from_secs(1));
    let high = queue.enqueue(TaskConfig::new("command").priority(Priority::High)).await.unwrap();

    let worker = WorkerId::new("w1");
    let first = queue.claim(&worker, ResourceRequirements::default()).await.unwrap().unwrap();
    let second = queue.claim(&worker, ResourceRequirements::default()).await.unwrap().unwrap();

    assert_eq!(first.id, high.id);
    assert_eq!(second.id, low.id);
}

// ---------------------------------------------------------------------
// Scenario 3: resource filter
// ---------------------------------------------------------------------

#[tokio::test]
async fn resource_filter_blocks_then_allows_claim() {
    let (_repository, queue, _clock) = fake_repo_and_queue();
    let enqueued = queue.enqueue(TaskConfig::new("command").required_cpu_cores(4.0)).await.unwrap();

    let worker = WorkerId::new("w1");
    let too_small = queue.claim(&worker, ResourceRequirements { cpu_cores: 2.0, memory_mb: 0 }).await.unwrap();
    assert!(too_small.is_none());

    let enough = queue.claim(&worker, ResourceRequirements { cpu_cores: 8.0, memory_mb: 0 }).await.unwrap().unwrap();
    assert_eq!(enough.id, enqueued.id);
}

// ---------------------------------------------------------------------
// Scenario 4: retry then success
// ---------------------------------------------------------------------

#[tokio::test]
async fn retry_then_success_completes_with_expected_history() {
    let (repository, queue, _clock) = fake_repo_and_queue();
    let pool = Arc::new(WorkerPool::new(
        repository.clone(),
        Arc::new(FakeResourceMonitor::new(10.0, 10.0)),
        Arc::new(NullNotifier),
        fast_pool_config(),
    ));
    pool.register_executor("flaky", Arc::new(FlakyExecutor::new(2)));
    pool.start();

    let task = queue.enqueue(TaskConfig::new("flaky").max_retries(2).retry_delay_seconds(0)).await.unwrap();

    let finished = pool.wait_for_completion(&task.id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(finished.status, TaskStatus::Completed);
    assert_eq!(finished.retry_count, 2);

    let history: Vec<_> = repository.get_task_history(&task.id).await.unwrap().into_iter().map(|e| e.event_type).collect();
    use toil_core::EventType::*;
    assert_eq!(history, vec![Started, Failed, Retrying, Started, Failed, Retrying, Started, Completed]);

    pool.stop(Duration::from_millis(200)).await;
}

// ---------------------------------------------------------------------
// Scenario 5: dead letter on exhaustion
// ---------------------------------------------------------------------

#[tokio::test]
async fn dead_letter_on_retry_exhaustion() {
    let (repository, queue, _clock) = fake_repo_and_queue();
    let pool = Arc::new(WorkerPool::new(
        repository.clone(),
        Arc::new(FakeResourceMonitor::new(10.0, 10.0)),
        Arc::new(NullNotifier),
        fast_pool_config(),
    ));
    pool.register_executor("doomed", Arc::new(AlwaysFailExecutor));
    pool.start();

    let task = queue.enqueue(TaskConfig::new("doomed").max_retries(2).retry_delay_seconds(0)).await.unwrap();

    let finished = pool.wait_for_completion(&task.id, Duration::from_secs(5)).await.unwrap();
    assert_eq!(finished.status, TaskStatus::DeadLetter);
    assert_eq!(finished.retry_count, 2);
    assert_eq!(finished.last_error.as_deref(), Some("transient executor failure: the executor never succeeds"));

    pool.stop(Duration::from_millis(200)).await;
}

// ---------------------------------------------------------------------
// Scenario 6: heartbeat-based stuck
// ---------------------------------------------------------------------

#[test]
fn heartbeat_stale_task_is_stuck() {
    let registry = toil_stuck::ThresholdRegistry::new();
    let now = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
    let mut task = toil_core::Task::new(TaskConfig::new("command"), now - Duration::from_secs(15 * 60));
    task.status = TaskStatus::Running;
    task.last_heartbeat = Some(now - Duration::from_secs(10 * 60));

    let verdict = toil_stuck::is_stuck(Some(&task), &[], &registry, now);
    assert!(verdict.stuck);
    assert!(verdict.reason.unwrap().contains("no heartbeat"));
}

#[test]
fn heartbeat_never_received_is_stuck_with_no_heartbeat_reason() {
    let registry = toil_stuck::ThresholdRegistry::new();
    let now = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
    let mut task = toil_core::Task::new(TaskConfig::new("command"), now);
    task.status = TaskStatus::Running;
    task.last_heartbeat = None;

    let verdict = toil_stuck::is_stuck(Some(&task), &[], &registry, now);
    assert!(verdict.stuck);
    assert!(verdict.reason.unwrap().contains("no heartbeat"));
}

// ---------------------------------------------------------------------
// Scenario 7: endless task zombie
// ---------------------------------------------------------------------

#[test]
fn endless_task_zombie_is_stuck_independent_of_heartbeat() {
    let registry = toil_stuck::ThresholdRegistry::new();
    let now = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
    let mut task = toil_core::Task::new(TaskConfig::new("command").config(toil_core::TaskRuntimeConfig::endless()), now);
    task.status = TaskStatus::Running;
    task.last_heartbeat = Some(now); // fresh heartbeat, irrelevant for endless tasks

    let zombie = ResourceSnapshot::builder().task_id(task.id).process_state(toil_core::ProcessState::Zombie).build();
    let verdict = toil_stuck::is_stuck(Some(&task), &[zombie], &registry, now);
    assert!(verdict.stuck);
    assert_eq!(verdict.reason.as_deref(), Some("process is in zombie state"));
}

// ---------------------------------------------------------------------
// Scenario 8: memory-leak detection
// ---------------------------------------------------------------------

#[test]
fn growing_memory_across_six_snapshots_is_flagged_a_leak() {
    let registry = toil_stuck::ThresholdRegistry::new();
    let now = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
    let mut task = toil_core::Task::new(TaskConfig::new("command"), now);
    task.status = TaskStatus::Running;
    task.last_heartbeat = Some(now);

    // Newest-first, matching `ResourceMonitor::snapshot_window`'s contract.
    let megabytes = [200, 180, 160, 140, 120, 100];
    let snapshots: Vec<_> = megabytes.iter().map(|mb| snapshot(task.id, mb * 1_000_000)).collect();

    let verdict = toil_stuck::is_stuck(Some(&task), &snapshots, &registry, now);
    assert!(verdict.stuck);
    assert_eq!(verdict.reason.as_deref(), Some("potential memory leak detected"));
}

#[test]
fn stable_memory_across_five_snapshots_is_not_flagged() {
    let registry = toil_stuck::ThresholdRegistry::new();
    let now = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
    let mut task = toil_core::Task::new(TaskConfig::new("command"), now);
    task.status = TaskStatus::Running;
    task.last_heartbeat = Some(now);

    let snapshots: Vec<_> = (0..5).map(|_| snapshot(task.id, 100_000_000)).collect();

    let verdict = toil_stuck::is_stuck(Some(&task), &snapshots, &registry, now);
    assert!(!verdict.stuck);
}

// ---------------------------------------------------------------------
// Scenario 9: scale-up gating
// ---------------------------------------------------------------------

// Both tests size `required_cpu_cores` so far above `FakeResourceMonitor`'s
// fixed 8-core budget that no worker, at any worker_count, can ever claim
// these tasks. That holds `pending_count` steady at 20 for the test's
// duration, so the single scaling tick under test evaluates the gate in
// isolation instead of racing against tasks draining out of the queue.

#[tokio::test]
async fn high_cpu_load_blocks_scale_up_despite_queue_pressure() {
    let (repository, queue, _clock) = fake_repo_and_queue();
    let mut config = fast_pool_config();
    config.min_workers = 2;
    config.scale_interval = Duration::from_millis(300);
    let pool = Arc::new(WorkerPool::new(repository, Arc::new(FakeResourceMonitor::new(85.0, 30.0)), Arc::new(NullNotifier), config));
    pool.start();

    for _ in 0..20 {
        queue.enqueue(TaskConfig::new("command").required_cpu_cores(1000.0)).await.unwrap();
    }

    // One real scaling tick lands around t=300ms (the interval's first tick
    // fires immediately, before any tasks are enqueued, and is a no-op).
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(pool.worker_count(), 2);

    pool.stop(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn low_cpu_load_with_deep_queue_scales_up() {
    let (repository, queue, _clock) = fake_repo_and_queue();
    let mut config = fast_pool_config();
    config.min_workers = 2;
    config.max_workers = 20;
    config.scale_interval = Duration::from_millis(300);
    let pool =
        Arc::new(WorkerPool::new(repository, Arc::new(FakeResourceMonitor::new(30.0, 30.0)), Arc::new(NullNotifier), config));
    pool.start();

    for _ in 0..20 {
        queue.enqueue(TaskConfig::new("command").required_cpu_cores(1000.0)).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(pool.worker_count(), 5);

    pool.stop(Duration::from_millis(200)).await;
}

// ---------------------------------------------------------------------
// Scenario 10: graceful shutdown
// ---------------------------------------------------------------------

#[tokio::test]
async fn graceful_shutdown_drains_within_the_grace_period_despite_uncooperative_executors() {
    let (repository, queue, _clock) = fake_repo_and_queue();
    let mut config = fast_pool_config();
    config.min_workers = 3;
    let pool = Arc::new(WorkerPool::new(repository.clone(), Arc::new(FakeResourceMonitor::new(10.0, 10.0)), Arc::new(NullNotifier), config));
    pool.register_executor("slow", Arc::new(SlowExecutor));
    pool.start();

    let first = queue.enqueue(TaskConfig::new("slow")).await.unwrap();
    let second = queue.enqueue(TaskConfig::new("slow")).await.unwrap();

    // Give the pool's three workers a chance to claim the two slow tasks.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    pool.stop(Duration::from_millis(100)).await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(pool.worker_count(), 0);

    let first_task = repository.get_by_id(&first.id).await.unwrap().unwrap();
    let second_task = repository.get_by_id(&second.id).await.unwrap().unwrap();
    assert_eq!(first_task.status, TaskStatus::Running);
    assert_eq!(second_task.status, TaskStatus::Running);
}

// ---------------------------------------------------------------------
// Quantified invariants
// ---------------------------------------------------------------------

/// For all concurrent worker claims of the same pending task, exactly one
/// worker receives it.
#[tokio::test]
async fn concurrent_claims_are_exclusive() {
    let (_repository, queue, _clock) = fake_repo_and_queue();
    queue.enqueue(TaskConfig::new("command")).await.unwrap();

    let mut attempts = tokio::task::JoinSet::new();
    for i in 0..8 {
        let queue = queue.clone();
        attempts.spawn(async move { queue.claim(&WorkerId::new(format!("w{i}")), ResourceRequirements::default()).await.unwrap() });
    }

    let mut winners = 0;
    while let Some(result) = attempts.join_next().await {
        if result.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

proptest! {
    /// Retry count is non-decreasing across a task's lifetime and never
    /// exceeds `max_retries` once the task reaches a terminal state other
    /// than mid-retry. Each case spins up a full worker pool, so the case
    /// count is kept well below proptest's default.
    #![proptest_config(ProptestConfig::with_cases(20))]
    #[test]
    fn retry_count_never_exceeds_max_retries_at_dead_letter(max_retries in 0u32..5) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let (repository, queue, _clock) = fake_repo_and_queue();
            let pool = Arc::new(WorkerPool::new(
                repository.clone(),
                Arc::new(FakeResourceMonitor::new(10.0, 10.0)),
                Arc::new(NullNotifier),
                fast_pool_config(),
            ));
            pool.register_executor("doomed", Arc::new(AlwaysFailExecutor));
            pool.start();

            let task = queue.enqueue(TaskConfig::new("doomed").max_retries(max_retries).retry_delay_seconds(0)).await.unwrap();
            let finished = pool.wait_for_completion(&task.id, Duration::from_secs(10)).await.unwrap();

            prop_assert_eq!(finished.status, TaskStatus::DeadLetter);
            prop_assert_eq!(finished.retry_count, max_retries);
            prop_assert!(finished.retry_count <= max_retries);

            pool.stop(Duration::from_millis(200)).await;
            Ok(())
        })?;
    }

    /// `is_stuck` is a pure function: the same (task, snapshots, now) input
    /// always produces the same verdict.
    #[test]
    fn is_stuck_is_deterministic(heartbeat_age_secs in 0u64..1200, memory_mb in 50u64..500) {
        let registry = toil_stuck::ThresholdRegistry::new();
        let now = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(100_000);
        let mut task = toil_core::Task::new(TaskConfig::new("command"), now);
        task.status = TaskStatus::Running;
        task.last_heartbeat = Some(now - Duration::from_secs(heartbeat_age_secs));
        let snapshots = vec![snapshot(task.id, memory_mb * 1_000_000)];

        let first = toil_stuck::is_stuck(Some(&task), &snapshots, &registry, now);
        let second = toil_stuck::is_stuck(Some(&task), &snapshots, &registry, now);
        prop_assert_eq!(first, second);
    }
}
