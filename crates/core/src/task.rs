// SPDX-License-Identifier: MIT

//! Task identifier and the central task record.

use crate::config::TaskRuntimeConfig;
use crate::priority::Priority;
use crate::status::TaskStatus;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::SystemTime;

crate::define_id! {
    /// Unique identifier for a task instance.
    pub struct TaskId("tsk-");
}

/// Submission-time configuration for a new task. Mirrors the normative
/// field list/order of the persistent task record: everything not set
/// here gets the defaults `Enqueue` applies (status=PENDING,
/// priority=NORMAL, scheduled_at=now).
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub id: TaskId,
    pub task_type: String,
    pub task_name: String,
    pub priority: Priority,
    pub scheduled_at: Option<SystemTime>,
    pub deadline: Option<SystemTime>,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub correlation_id: Option<String>,
    pub trace_id: Option<String>,
    pub required_cpu_cores: f64,
    pub required_memory_mb: u64,
    pub config: TaskRuntimeConfig,
    /// Opaque, executor-defined work item: a shell command line, an LLM
    /// prompt, debate participants, embedding input, etc. The engine never
    /// interprets this; only the `Executor` resolved by `task_type` does.
    pub payload: JsonValue,
}

impl TaskConfig {
    pub fn new(task_type: impl Into<String>) -> Self {
        let task_type = task_type.into();
        Self {
            id: TaskId::new(),
            task_name: task_type.clone(),
            task_type,
            priority: Priority::Normal,
            scheduled_at: None,
            deadline: None,
            max_retries: 0,
            retry_delay_seconds: 0,
            correlation_id: None,
            trace_id: None,
            required_cpu_cores: 0.0,
            required_memory_mb: 0,
            config: TaskRuntimeConfig::default(),
            payload: JsonValue::Null,
        }
    }

    crate::setters! {
        into {
            task_name: String,
        }
        set {
            priority: Priority,
            max_retries: u32,
            retry_delay_seconds: u64,
            required_cpu_cores: f64,
            required_memory_mb: u64,
            config: TaskRuntimeConfig,
            scheduled_at: Option<SystemTime>,
            deadline: Option<SystemTime>,
            payload: JsonValue,
        }
        option {
            correlation_id: String,
            trace_id: String,
        }
    }
}

/// A declared resource requirement, used both by `Task::required_*` and by
/// `Executor::resource_requirements`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub cpu_cores: f64,
    pub memory_mb: u64,
}

/// The central work-item record. Owned exclusively by the repository; the
/// worker pool mutates it only through repository calls and holds
/// transient references during dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    pub task_name: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub scheduled_at: SystemTime,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub worker_id: Option<WorkerId>,
    /// 0-100.
    pub progress: f64,
    pub progress_message: Option<String>,
    /// Captured executor output on success, when `config.capture_output`.
    /// Kept separate from `progress_message` (see design notes).
    pub output: Option<String>,
    pub last_heartbeat: Option<SystemTime>,
    pub deadline: Option<SystemTime>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub last_error: Option<String>,
    pub correlation_id: Option<String>,
    pub trace_id: Option<String>,
    pub required_cpu_cores: f64,
    pub required_memory_mb: u64,
    pub process_pid: Option<u32>,
    pub config: TaskRuntimeConfig,
    pub checkpoint: Option<Vec<u8>>,
    pub payload: JsonValue,
}

impl Task {
    /// Build a new PENDING task from submission config, stamping
    /// `created_at`/`updated_at` and defaulting `scheduled_at` to now.
    pub fn new(config: TaskConfig, now: SystemTime) -> Self {
        Self {
            id: config.id,
            task_type: config.task_type,
            task_name: config.task_name,
            priority: config.priority,
            status: TaskStatus::Pending,
            scheduled_at: config.scheduled_at.unwrap_or(now),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            worker_id: None,
            progress: 0.0,
            progress_message: None,
            output: None,
            last_heartbeat: None,
            deadline: config.deadline,
            retry_count: 0,
            max_retries: config.max_retries,
            retry_delay_seconds: config.retry_delay_seconds,
            last_error: None,
            correlation_id: config.correlation_id,
            trace_id: config.trace_id,
            required_cpu_cores: config.required_cpu_cores,
            required_memory_mb: config.required_memory_mb,
            process_pid: None,
            config: config.config,
            checkpoint: None,
            payload: config.payload,
        }
    }

    pub fn resource_requirements(&self) -> ResourceRequirements {
        ResourceRequirements { cpu_cores: self.required_cpu_cores, memory_mb: self.required_memory_mb }
    }

    /// Effective stuck-detection heartbeat threshold in seconds: the
    /// per-task override if set, otherwise the registered task_type
    /// default (resolved by the caller). Zero means "disabled".
    pub fn effective_stuck_threshold(&self) -> Option<u64> {
        if self.config.stuck_threshold_seconds > 0 {
            Some(self.config.stuck_threshold_seconds)
        } else {
            None
        }
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            task_type: String = "test-task",
            task_name: String = "test-task",
        }
        set {
            id: TaskId = TaskId::new(),
            priority: Priority = Priority::Normal,
            status: TaskStatus = TaskStatus::Pending,
            scheduled_at: SystemTime = SystemTime::UNIX_EPOCH,
            created_at: SystemTime = SystemTime::UNIX_EPOCH,
            updated_at: SystemTime = SystemTime::UNIX_EPOCH,
            progress: f64 = 0.0,
            retry_count: u32 = 0,
            max_retries: u32 = 0,
            retry_delay_seconds: u64 = 0,
            required_cpu_cores: f64 = 0.0,
            required_memory_mb: u64 = 0,
            config: TaskRuntimeConfig = TaskRuntimeConfig::default(),
            payload: JsonValue = JsonValue::Null,
        }
        option {
            started_at: SystemTime = None,
            completed_at: SystemTime = None,
            worker_id: WorkerId = None,
            progress_message: String = None,
            output: String = None,
            last_heartbeat: SystemTime = None,
            deadline: SystemTime = None,
            last_error: String = None,
            correlation_id: String = None,
            trace_id: String = None,
            process_pid: u32 = None,
            checkpoint: Vec<u8> = None,
        }
    }
}
