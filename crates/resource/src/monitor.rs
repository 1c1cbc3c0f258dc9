// SPDX-License-Identifier: MIT

//! The resource monitor: host-wide and per-process sampling.
//!
//! Host counters in this implementation come from `sysinfo`; per-process
//! file-descriptor and thread counts are read from `/proc` on Linux and
//! default to zero elsewhere. Per spec.md §4.2, only the trait contract is
//! normative — the OS facility behind it is an implementation detail.

use crate::cache::TtlCache;
use crate::error::ResourceError;
use crate::system::SystemResources;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use sysinfo::{Pid, ProcessStatus, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toil_core::{ProcessState, ResourceRequirements, ResourceSnapshot, TaskId};
use toil_storage::Repository;

/// Host resources cache TTL (spec.md default 2s).
const HOST_CACHE_TTL: Duration = Duration::from_secs(2);
/// Minimum in-memory ring buffer size per monitored task (spec.md: "≥5").
const SNAPSHOT_WINDOW: usize = 8;
const MAX_CPU_LOAD_PERCENT: f64 = 90.0;
const MAX_MEMORY_USED_PERCENT: f64 = 90.0;

#[async_trait]
pub trait ResourceMonitor: Send + Sync + 'static {
    fn system_resources(&self) -> SystemResources;
    fn process_resources(&self, pid: u32) -> Result<ResourceSnapshot, ResourceError>;
    async fn start_monitoring(&self, task_id: TaskId, pid: u32, interval: Duration) -> Result<(), ResourceError>;
    async fn stop_monitoring(&self, task_id: TaskId);
    fn latest_snapshot(&self, task_id: &TaskId) -> Result<ResourceSnapshot, ResourceError>;
    /// Most-recent-first window of retained snapshots, the input the
    /// stuck detector consumes. Empty when not monitoring.
    fn snapshot_window(&self, task_id: &TaskId) -> Vec<ResourceSnapshot>;
    fn is_resource_available(&self, requirements: ResourceRequirements) -> bool;
}

struct TaskMonitor {
    buffer: Arc<Mutex<VecDeque<ResourceSnapshot>>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SysinfoResourceMonitor {
    system: Arc<Mutex<System>>,
    host_cache: TtlCache<SystemResources>,
    repository: Arc<dyn Repository>,
    tasks: Arc<Mutex<HashMap<TaskId, TaskMonitor>>>,
}

impl SysinfoResourceMonitor {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            system: Arc::new(Mutex::new(system)),
            host_cache: TtlCache::new(HOST_CACHE_TTL),
            repository,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn refresh_host(&self) -> SystemResources {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total_cpu_cores = system.cpus().len().max(1);
        let cpu_load_percent =
            system.cpus().iter().map(|c| c.cpu_usage() as f64).sum::<f64>() / total_cpu_cores as f64;
        let available_cpu_cores =
            ((100.0 - cpu_load_percent) / 100.0 * total_cpu_cores as f64).round().max(0.0) as usize;

        let total_memory_mb = system.total_memory() / (1024 * 1024);
        let used_memory_mb = system.used_memory() / (1024 * 1024);
        let available_memory_mb = total_memory_mb.saturating_sub(used_memory_mb);
        let memory_used_percent =
            if total_memory_mb > 0 { used_memory_mb as f64 / total_memory_mb as f64 * 100.0 } else { 0.0 };

        let disk_used_percent = 0.0; // left to a real deployment's disk-usage adapter.
        let load_avg = System::load_average();

        SystemResources {
            total_cpu_cores,
            available_cpu_cores,
            total_memory_mb,
            available_memory_mb,
            cpu_load_percent,
            memory_used_percent,
            disk_used_percent,
            load_average_1: load_avg.one,
            load_average_5: load_avg.five,
            load_average_15: load_avg.fifteen,
        }
    }

    fn sample_process(system: &mut System, task_id: TaskId, pid: u32) -> Result<ResourceSnapshot, ResourceError> {
        let sysinfo_pid = Pid::from_u32(pid);
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[sysinfo_pid]), true);
        let process = system.process(sysinfo_pid).ok_or(ResourceError::NotFound(pid))?;

        let total_memory_kb = system.total_memory() / 1024;
        let memory_rss_bytes = process.memory();
        let memory_percent = if total_memory_kb > 0 {
            (memory_rss_bytes / 1024) as f64 / total_memory_kb as f64 * 100.0
        } else {
            0.0
        };
        let disk = process.disk_usage();

        Ok(ResourceSnapshot {
            task_id,
            sampled_at: SystemTime::now(),
            cpu_percent: process.cpu_usage() as f64,
            cpu_user_time: process.accumulated_cpu_time() as f64 / 1000.0,
            cpu_system_time: 0.0,
            memory_rss_bytes,
            memory_vms_bytes: process.virtual_memory(),
            memory_percent,
            io_read_bytes: disk.total_read_bytes,
            io_write_bytes: disk.total_written_bytes,
            io_read_count: 0,
            io_write_count: 0,
            net_connections: 0,
            net_bytes_sent: 0,
            net_bytes_recv: 0,
            open_fds: linux_fd_count(pid),
            open_files: linux_fd_count(pid),
            thread_count: linux_thread_count(pid),
            process_state: map_process_status(process.status()),
        })
    }
}

fn map_process_status(status: ProcessStatus) -> ProcessState {
    match status {
        ProcessStatus::Run => ProcessState::Running,
        ProcessStatus::Sleep | ProcessStatus::Idle | ProcessStatus::Waking => ProcessState::Sleeping,
        ProcessStatus::Stop | ProcessStatus::Tracing => ProcessState::Stopped,
        ProcessStatus::Zombie => ProcessState::Zombie,
        _ => ProcessState::Unknown,
    }
}

#[cfg(target_os = "linux")]
fn linux_fd_count(pid: u32) -> u32 {
    std::fs::read_dir(format!("/proc/{pid}/fd")).map(|entries| entries.count() as u32).unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn linux_fd_count(_pid: u32) -> u32 {
    0
}

#[cfg(target_os = "linux")]
fn linux_thread_count(pid: u32) -> u32 {
    std::fs::read_to_string(format!("/proc/{pid}/status"))
        .ok()
        .and_then(|contents| {
            contents
                .lines()
                .find_map(|line| line.strip_prefix("Threads:"))
                .and_then(|v| v.trim().parse().ok())
        })
        .unwrap_or(1)
}

#[cfg(not(target_os = "linux"))]
fn linux_thread_count(_pid: u32) -> u32 {
    1
}

#[async_trait]
impl ResourceMonitor for SysinfoResourceMonitor {
    fn system_resources(&self) -> SystemResources {
        if let Some(cached) = self.host_cache.get() {
            return cached;
        }
        let resources = self.refresh_host();
        self.host_cache.set(resources);
        resources
    }

    fn process_resources(&self, pid: u32) -> Result<ResourceSnapshot, ResourceError> {
        let mut system = self.system.lock();
        Self::sample_process(&mut system, TaskId::new(), pid)
    }

    async fn start_monitoring(&self, task_id: TaskId, pid: u32, interval: Duration) -> Result<(), ResourceError> {
        {
            let tasks = self.tasks.lock();
            if tasks.contains_key(&task_id) {
                return Err(ResourceError::AlreadyMonitoring(task_id));
            }
        }

        let buffer = Arc::new(Mutex::new(VecDeque::with_capacity(SNAPSHOT_WINDOW)));
        let cancel = CancellationToken::new();
        let system = self.system.clone();
        let repository = self.repository.clone();
        let loop_buffer = buffer.clone();
        let loop_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sample = {
                            let mut system = system.lock();
                            SysinfoResourceMonitor::sample_process(&mut system, task_id, pid)
                        };
                        let Ok(snapshot) = sample else {
                            // Process is gone; stop sampling but leave the
                            // last retained window for post-mortem analysis.
                            break;
                        };
                        {
                            let mut buffer = loop_buffer.lock();
                            buffer.push_front(snapshot.clone());
                            if buffer.len() > SNAPSHOT_WINDOW {
                                buffer.pop_back();
                            }
                        }
                        let repository = repository.clone();
                        tokio::spawn(async move {
                            if let Err(err) = repository.save_resource_snapshot(snapshot).await {
                                tracing::warn!(task_id = %task_id, error = %err, "failed to persist resource snapshot");
                            }
                        });
                    }
                }
            }
        });

        self.tasks.lock().insert(task_id, TaskMonitor { buffer, cancel, handle });
        Ok(())
    }

    async fn stop_monitoring(&self, task_id: TaskId) {
        let monitor = self.tasks.lock().remove(&task_id);
        if let Some(monitor) = monitor {
            monitor.cancel.cancel();
            monitor.handle.abort();
        }
    }

    fn latest_snapshot(&self, task_id: &TaskId) -> Result<ResourceSnapshot, ResourceError> {
        let tasks = self.tasks.lock();
        let monitor = tasks.get(task_id).ok_or(ResourceError::NotMonitoring(*task_id))?;
        monitor.buffer.lock().front().cloned().ok_or(ResourceError::NotMonitoring(*task_id))
    }

    fn snapshot_window(&self, task_id: &TaskId) -> Vec<ResourceSnapshot> {
        let tasks = self.tasks.lock();
        match tasks.get(task_id) {
            Some(monitor) => monitor.buffer.lock().iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    fn is_resource_available(&self, requirements: ResourceRequirements) -> bool {
        let resources = self.system_resources();
        requirements.cpu_cores <= resources.available_cpu_cores as f64
            && requirements.memory_mb <= resources.available_memory_mb
            && resources.has_headroom(MAX_CPU_LOAD_PERCENT, MAX_MEMORY_USED_PERCENT)
    }
}
