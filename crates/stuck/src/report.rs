// SPDX-License-Identifier: MIT

//! `Analyze`: a diagnostic report over the same inputs as `IsStuck`, without
//! mutating task state. Intended for operator-facing inspection endpoints.

use crate::detector::{is_stuck, StuckVerdict};
use crate::registry::ThresholdRegistry;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use toil_core::{ResourceSnapshot, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub threshold_seconds: u64,
    pub seconds_since_last_heartbeat: Option<u64>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub memory_percent: Option<f64>,
    pub open_fds: Option<u32>,
    pub thread_count: Option<u32>,
    pub exhausted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityStatus {
    pub cpu_percent: Option<f64>,
    pub io_bytes_delta: Option<u64>,
    pub appears_frozen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub stuck: bool,
    pub reason: Option<String>,
    pub heartbeat: HeartbeatStatus,
    pub resources: ResourceStatus,
    pub activity: ActivityStatus,
    pub recommendations: Vec<String>,
}

pub fn analyze(task: &Task, snapshots: &[ResourceSnapshot], registry: &ThresholdRegistry, now: SystemTime) -> DiagnosticReport {
    let StuckVerdict { stuck, reason } = is_stuck(Some(task), snapshots, registry, now);

    let threshold_seconds = if task.config.stuck_threshold_seconds > 0 {
        task.config.stuck_threshold_seconds
    } else {
        registry.threshold(&task.task_type).as_secs()
    };
    let seconds_since_last_heartbeat =
        task.last_heartbeat.and_then(|hb| now.duration_since(hb).ok()).map(|d| d.as_secs());
    let heartbeat = HeartbeatStatus {
        threshold_seconds,
        seconds_since_last_heartbeat,
        stale: threshold_seconds > 0 && seconds_since_last_heartbeat.map_or(true, |s| s > threshold_seconds),
    };

    let latest = snapshots.first();
    let resources = ResourceStatus {
        memory_percent: latest.map(|s| s.memory_percent),
        open_fds: latest.map(|s| s.open_fds),
        thread_count: latest.map(|s| s.thread_count),
        exhausted: latest.is_some_and(|s| s.memory_percent > 95.0 || s.open_fds > 10_000 || s.thread_count > 1_000),
    };

    let oldest = snapshots.last();
    let activity = ActivityStatus {
        cpu_percent: latest.map(|s| s.cpu_percent),
        io_bytes_delta: latest
            .zip(oldest)
            .map(|(newest, oldest)| newest.io_bytes_total().saturating_sub(oldest.io_bytes_total())),
        appears_frozen: latest.is_some_and(|s| s.cpu_percent < 0.1),
    };

    let mut recommendations = Vec::new();
    if heartbeat.stale {
        recommendations.push("investigate why the executor stopped reporting heartbeats".to_string());
    }
    if resources.exhausted {
        recommendations.push("consider cancelling the task before it exhausts host resources".to_string());
    }
    if activity.appears_frozen {
        recommendations.push("process shows no CPU activity; confirm it hasn't deadlocked".to_string());
    }
    if recommendations.is_empty() && !stuck {
        recommendations.push("no action needed".to_string());
    }

    DiagnosticReport { stuck, reason, heartbeat, resources, activity, recommendations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use toil_core::TaskConfig;

    #[test]
    fn healthy_task_recommends_no_action() {
        let registry = ThresholdRegistry::new();
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let mut task = Task::new(TaskConfig::new("command"), now);
        task.last_heartbeat = Some(now);
        let report = analyze(&task, &[], &registry, now);
        assert!(!report.stuck);
        assert_eq!(report.recommendations, vec!["no action needed".to_string()]);
    }

    #[test]
    fn stale_heartbeat_surfaces_recommendation() {
        let registry = ThresholdRegistry::new();
        registry.set_threshold("command", Duration::from_secs(30));
        let created = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let mut task = Task::new(TaskConfig::new("command"), created);
        task.last_heartbeat = Some(created);
        let now = created + Duration::from_secs(120);
        let report = analyze(&task, &[], &registry, now);
        assert!(report.stuck);
        assert!(report.heartbeat.stale);
        assert!(report.recommendations.iter().any(|r| r.contains("heartbeats")));
    }
}
