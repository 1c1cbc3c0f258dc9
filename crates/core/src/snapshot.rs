// SPDX-License-Identifier: MIT

//! Per-task OS-level resource snapshots.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// OS-level process state at sample time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    Unknown,
}

crate::simple_display! {
    ProcessState {
        Running => "running",
        Sleeping => "sleeping",
        Stopped => "stopped",
        Zombie => "zombie",
        Unknown => "unknown",
    }
}

impl ProcessState {
    pub fn is_zombie(self) -> bool {
        matches!(self, ProcessState::Zombie)
    }
}

/// A single sample of a running task's OS-level resource usage.
///
/// Produced by the resource monitor's per-task sampling loop; retained in a
/// bounded in-memory ring buffer and persisted asynchronously to the
/// repository. The stuck detector reads an ordered, most-recent-first
/// window of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub task_id: TaskId,
    pub sampled_at: SystemTime,
    pub cpu_percent: f64,
    pub cpu_user_time: f64,
    pub cpu_system_time: f64,
    pub memory_rss_bytes: u64,
    pub memory_vms_bytes: u64,
    pub memory_percent: f64,
    pub io_read_bytes: u64,
    pub io_write_bytes: u64,
    pub io_read_count: u64,
    pub io_write_count: u64,
    pub net_connections: u32,
    pub net_bytes_sent: u64,
    pub net_bytes_recv: u64,
    pub open_fds: u32,
    pub open_files: u32,
    pub thread_count: u32,
    pub process_state: ProcessState,
}

impl ResourceSnapshot {
    /// Total CPU time (user + system), used by the frozen-process check.
    pub fn cpu_time_total(&self) -> f64 {
        self.cpu_user_time + self.cpu_system_time
    }

    /// Total I/O bytes moved (read + write), used by the I/O starvation check.
    pub fn io_bytes_total(&self) -> u64 {
        self.io_read_bytes + self.io_write_bytes
    }

    /// Total network bytes moved (sent + recv), used by the network-hang check.
    pub fn net_bytes_total(&self) -> u64 {
        self.net_bytes_sent + self.net_bytes_recv
    }
}

crate::builder! {
    pub struct ResourceSnapshotBuilder => ResourceSnapshot {
        set {
            task_id: TaskId = TaskId::new(),
            sampled_at: SystemTime = SystemTime::UNIX_EPOCH,
            cpu_percent: f64 = 0.0,
            cpu_user_time: f64 = 0.0,
            cpu_system_time: f64 = 0.0,
            memory_rss_bytes: u64 = 0,
            memory_vms_bytes: u64 = 0,
            memory_percent: f64 = 0.0,
            io_read_bytes: u64 = 0,
            io_write_bytes: u64 = 0,
            io_read_count: u64 = 0,
            io_write_count: u64 = 0,
            net_connections: u32 = 0,
            net_bytes_sent: u64 = 0,
            net_bytes_recv: u64 = 0,
            open_fds: u32 = 0,
            open_files: u32 = 0,
            thread_count: u32 = 1,
            process_state: ProcessState = ProcessState::Running,
        }
    }
}
