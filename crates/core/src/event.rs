// SPDX-License-Identifier: MIT

//! Append-only execution history events.

use crate::task::TaskId;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Lifecycle transition kinds recorded in a task's execution history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Started,
    Progress,
    Heartbeat,
    Paused,
    Resumed,
    Completed,
    Failed,
    Stuck,
    Cancelled,
    Retrying,
    DeadLetter,
    Log,
    Resource,
}

crate::simple_display! {
    EventType {
        Created => "created",
        Started => "started",
        Progress => "progress",
        Heartbeat => "heartbeat",
        Paused => "paused",
        Resumed => "resumed",
        Completed => "completed",
        Failed => "failed",
        Stuck => "stuck",
        Cancelled => "cancelled",
        Retrying => "retrying",
        DeadLetter => "dead_letter",
        Log => "log",
        Resource => "resource",
    }
}

/// A single append-only entry in a task's execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHistoryEvent {
    pub task_id: TaskId,
    pub event_type: EventType,
    pub timestamp: SystemTime,
    pub worker_id: Option<WorkerId>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl ExecutionHistoryEvent {
    pub fn new(task_id: TaskId, event_type: EventType, timestamp: SystemTime) -> Self {
        Self { task_id, event_type, timestamp, worker_id: None, data: HashMap::new() }
    }

    pub fn with_worker(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
