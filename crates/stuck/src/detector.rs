// SPDX-License-Identifier: MIT

//! `IsStuck`: a pure function over a task and its resource-snapshot window.
//!
//! `snapshots` is always ordered most-recent-first (index 0 is newest) —
//! the same order [`toil_resource::ResourceMonitor::snapshot_window`]
//! returns.

use crate::registry::ThresholdRegistry;
use std::time::SystemTime;
use toil_core::{ProcessState, ResourceSnapshot, Task};

/// Outcome of evaluating [`is_stuck`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckVerdict {
    pub stuck: bool,
    pub reason: Option<String>,
}

impl StuckVerdict {
    fn not_stuck() -> Self {
        Self { stuck: false, reason: None }
    }

    fn stuck(reason: impl Into<String>) -> Self {
        Self { stuck: true, reason: Some(reason.into()) }
    }
}

const FROZEN_WINDOW: usize = 5;
const IO_WINDOW: usize = 4;
const LEAK_WINDOW: usize = 5;

pub fn is_stuck(task: Option<&Task>, snapshots: &[ResourceSnapshot], registry: &ThresholdRegistry, now: SystemTime) -> StuckVerdict {
    let Some(task) = task else {
        return StuckVerdict::not_stuck();
    };

    if task.config.endless {
        return endless_verdict(snapshots);
    }

    if let Some(verdict) = heartbeat_verdict(task, registry, now) {
        return verdict;
    }

    if let Some(deadline) = task.deadline {
        if now.duration_since(deadline).is_ok_and(|elapsed| !elapsed.is_zero()) {
            return StuckVerdict::stuck("task exceeded deadline");
        }
    }

    if snapshots.len() >= 3 {
        if let Some(verdict) = frozen_process_verdict(snapshots) {
            return verdict;
        }
        if let Some(verdict) = resource_exhaustion_verdict(snapshots) {
            return verdict;
        }
        if let Some(verdict) = io_starvation_verdict(snapshots) {
            return verdict;
        }
        if let Some(verdict) = network_hang_verdict(snapshots) {
            return verdict;
        }
        if let Some(verdict) = memory_leak_verdict(snapshots) {
            return verdict;
        }
    }

    StuckVerdict::not_stuck()
}

fn endless_verdict(snapshots: &[ResourceSnapshot]) -> StuckVerdict {
    let Some(latest) = snapshots.first() else {
        return StuckVerdict::not_stuck();
    };

    if latest.process_state == ProcessState::Zombie {
        return StuckVerdict::stuck("process is in zombie state");
    }
    if latest.memory_percent > 98.0 {
        return StuckVerdict::stuck("critical memory exhaustion");
    }
    if snapshots.len() >= 5 {
        let no_cpu_activity = snapshots.iter().all(|s| s.cpu_percent <= 0.0);
        let no_io_activity = snapshots.windows(2).all(|pair| {
            pair[0].io_read_bytes == pair[1].io_read_bytes && pair[0].io_write_bytes == pair[1].io_write_bytes
        });
        if no_cpu_activity && no_io_activity {
            return StuckVerdict::stuck("no activity");
        }
    }
    StuckVerdict::not_stuck()
}

fn heartbeat_verdict(task: &Task, registry: &ThresholdRegistry, now: SystemTime) -> Option<StuckVerdict> {
    let threshold = if task.config.stuck_threshold_seconds > 0 {
        task.config.stuck_threshold_seconds
    } else {
        registry.threshold(&task.task_type).as_secs()
    };
    if threshold == 0 {
        return None;
    }

    match task.last_heartbeat {
        None => Some(StuckVerdict::stuck(format!("no heartbeat received within {threshold}s"))),
        Some(last) => match now.duration_since(last) {
            Ok(elapsed) if elapsed.as_secs() > threshold => Some(StuckVerdict::stuck(format!(
                "no heartbeat received in the last {}s (threshold {threshold}s)",
                elapsed.as_secs()
            ))),
            _ => None,
        },
    }
}

fn frozen_process_verdict(snapshots: &[ResourceSnapshot]) -> Option<StuckVerdict> {
    let window = &snapshots[..snapshots.len().min(FROZEN_WINDOW)];
    let low_cpu_count = window.iter().filter(|s| s.cpu_percent < 0.1).count();
    if low_cpu_count < 3 {
        return None;
    }
    let newest = window.first()?;
    let oldest = window.last()?;
    let cpu_delta = newest.cpu_time_total() - oldest.cpu_time_total();
    if cpu_delta <= 0.01 {
        return Some(StuckVerdict::stuck("process appears frozen"));
    }
    None
}

fn resource_exhaustion_verdict(snapshots: &[ResourceSnapshot]) -> Option<StuckVerdict> {
    let latest = snapshots.first()?;
    if latest.memory_percent > 95.0 {
        return Some(StuckVerdict::stuck(format!("memory exhaustion: {:.1}%", latest.memory_percent)));
    }
    if latest.open_fds > 10_000 {
        return Some(StuckVerdict::stuck("file descriptor exhaustion"));
    }
    if latest.thread_count > 1_000 {
        return Some(StuckVerdict::stuck("excessive threads"));
    }
    None
}

fn io_starvation_verdict(snapshots: &[ResourceSnapshot]) -> Option<StuckVerdict> {
    let window = &snapshots[..snapshots.len().min(IO_WINDOW)];
    let newest = window.first()?;
    let oldest = window.last()?;
    let io_delta = newest.io_bytes_total().saturating_sub(oldest.io_bytes_total());
    if io_delta == 0 && newest.cpu_percent > 0.0 && newest.cpu_percent < 1.0 {
        return Some(StuckVerdict::stuck("process appears I/O starved"));
    }
    None
}

fn network_hang_verdict(snapshots: &[ResourceSnapshot]) -> Option<StuckVerdict> {
    let window = &snapshots[..snapshots.len().min(IO_WINDOW)];
    let newest = window.first()?;
    let oldest = window.last()?;
    let net_delta = newest.net_bytes_total().saturating_sub(oldest.net_bytes_total());
    if newest.net_connections > 0 && net_delta == 0 && newest.cpu_percent < 1.0 {
        return Some(StuckVerdict::stuck("process appears hung on network I/O"));
    }
    None
}

fn memory_leak_verdict(snapshots: &[ResourceSnapshot]) -> Option<StuckVerdict> {
    if snapshots.len() < LEAK_WINDOW {
        return None;
    }
    // Snapshots are newest-first; walk oldest-to-newest for monotonicity.
    let oldest_to_newest: Vec<&ResourceSnapshot> = snapshots.iter().rev().collect();
    let total_pairs = oldest_to_newest.len() - 1;
    let non_decreasing_pairs =
        oldest_to_newest.windows(2).filter(|pair| pair[1].memory_rss_bytes >= pair[0].memory_rss_bytes).count();

    let oldest = oldest_to_newest.first()?;
    let newest = oldest_to_newest.last()?;
    if oldest.memory_rss_bytes == 0 {
        return None;
    }
    let growth = (newest.memory_rss_bytes as f64 - oldest.memory_rss_bytes as f64) / oldest.memory_rss_bytes as f64;

    if total_pairs > 0
        && non_decreasing_pairs as f64 / total_pairs as f64 >= 0.8
        && growth > 0.5
    {
        return Some(StuckVerdict::stuck("potential memory leak detected"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toil_core::{TaskConfig, TaskRuntimeConfig, TaskStatus};

    fn base_task() -> Task {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut task = Task::new(TaskConfig::new("command"), now);
        task.status = TaskStatus::Running;
        task.last_heartbeat = Some(now);
        task
    }

    fn snapshot(task_id: toil_core::TaskId, memory_rss: u64, cpu_percent: f64) -> ResourceSnapshot {
        toil_core::ResourceSnapshot::builder()
            .task_id(task_id)
            .memory_rss_bytes(memory_rss)
            .cpu_percent(cpu_percent)
            .build()
    }

    #[test]
    fn nil_task_is_never_stuck() {
        let registry = ThresholdRegistry::new();
        let verdict = is_stuck(None, &[], &registry, SystemTime::now());
        assert!(!verdict.stuck);
    }

    #[test]
    fn stale_heartbeat_trips_detection() {
        let registry = ThresholdRegistry::new();
        registry.set_threshold("command", Duration::from_secs(60));
        let mut task = base_task();
        task.last_heartbeat = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000));
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_200);
        let verdict = is_stuck(Some(&task), &[], &registry, now);
        assert!(verdict.stuck);
        assert!(verdict.reason.unwrap().contains("heartbeat"));
    }

    #[test]
    fn endless_task_ignores_heartbeat_but_flags_zombie() {
        let registry = ThresholdRegistry::new();
        let mut task = base_task();
        task.config = TaskRuntimeConfig::endless();
        task.last_heartbeat = None;
        let snapshots = vec![ResourceSnapshot {
            process_state: ProcessState::Zombie,
            ..snapshot(task.id, 1024, 0.0)
        }];
        let verdict = is_stuck(Some(&task), &snapshots, &registry, SystemTime::now());
        assert!(verdict.stuck);
        assert_eq!(verdict.reason.as_deref(), Some("process is in zombie state"));
    }

    #[test]
    fn deadline_exceeded_is_stuck() {
        let registry = ThresholdRegistry::new();
        let mut task = base_task();
        task.deadline = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_100));
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_200);
        let verdict = is_stuck(Some(&task), &[], &registry, now);
        assert!(verdict.stuck);
        assert_eq!(verdict.reason.as_deref(), Some("task exceeded deadline"));
    }

    #[test]
    fn frozen_process_detected_from_flat_cpu_time() {
        let registry = ThresholdRegistry::new();
        let task = base_task();
        let snapshots: Vec<ResourceSnapshot> =
            (0..5).map(|_| snapshot(task.id, 1024, 0.05)).collect();
        let verdict = is_stuck(Some(&task), &snapshots, &registry, task.last_heartbeat.unwrap());
        assert!(verdict.stuck);
        assert_eq!(verdict.reason.as_deref(), Some("process appears frozen"));
    }

    #[test]
    fn memory_leak_detected_from_steady_growth() {
        let registry = ThresholdRegistry::new();
        let task = base_task();
        // newest-first: growth from 1000 (oldest) to 2000 (newest) bytes.
        let snapshots: Vec<ResourceSnapshot> = vec![2000, 1800, 1500, 1200, 1000]
            .into_iter()
            .map(|rss| snapshot(task.id, rss, 5.0))
            .collect();
        let verdict = is_stuck(Some(&task), &snapshots, &registry, task.last_heartbeat.unwrap());
        assert!(verdict.stuck);
        assert_eq!(verdict.reason.as_deref(), Some("potential memory leak detected"));
    }

    #[test]
    fn healthy_task_with_activity_is_not_stuck() {
        let registry = ThresholdRegistry::new();
        let task = base_task();
        let snapshots: Vec<ResourceSnapshot> = (0..5)
            .map(|i| ResourceSnapshot {
                io_read_bytes: i * 100,
                ..snapshot(task.id, 1024, 25.0)
            })
            .collect();
        let verdict = is_stuck(Some(&task), &snapshots, &registry, task.last_heartbeat.unwrap());
        assert!(!verdict.stuck);
    }
}
