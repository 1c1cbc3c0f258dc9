// SPDX-License-Identifier: MIT

//! Per-worker state tracked by the pool.

use std::time::SystemTime;
use toil_core::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
    Stopping,
    Stopped,
}

toil_core::simple_display! {
    WorkerState {
        Idle => "idle",
        Busy => "busy",
        Stopping => "stopping",
        Stopped => "stopped",
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_duration: std::time::Duration,
    pub started_at: SystemTime,
    pub last_activity: SystemTime,
    pub current_task: Option<TaskId>,
}

impl WorkerStats {
    pub fn new(now: SystemTime) -> Self {
        Self {
            tasks_completed: 0,
            tasks_failed: 0,
            total_duration: std::time::Duration::ZERO,
            started_at: now,
            last_activity: now,
            current_task: None,
        }
    }
}
