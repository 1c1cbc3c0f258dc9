// SPDX-License-Identifier: MIT

//! IPC protocol for daemon communication.
//!
//! Wire format: newline-delimited JSON over a Unix socket — one `Request`
//! per line in, one `Response` per line out.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use toil_core::TaskId;

/// Request from the CLI (or any other client) to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check.
    Ping,

    /// Submit a new task.
    Submit {
        task_type: String,
        #[serde(default)]
        task_name: Option<String>,
        #[serde(default)]
        priority: Option<String>,
        #[serde(default)]
        payload: JsonValue,
        #[serde(default)]
        max_retries: u32,
        #[serde(default)]
        required_cpu_cores: f64,
        #[serde(default)]
        required_memory_mb: u64,
    },

    /// Fetch a single task's current record.
    Status { id: String },

    /// List tasks by status (pending/running/completed/failed/...).
    List { status: String, #[serde(default)] limit: usize },

    /// Request a running task be cancelled.
    Cancel { id: String },

    /// Pool-wide stats: worker count, queue depth by priority.
    Stats,

    /// Request daemon shutdown.
    Shutdown,
}

/// Response from the daemon to a client request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Submitted { id: String },
    Task { task: Box<toil_core::Task> },
    TaskList { tasks: Vec<toil_core::Task> },
    Stats { worker_count: usize, pending_by_priority: Vec<(String, u64)> },
    Cancelled { id: String },
    ShuttingDown,
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }
}

/// Parses a `TaskId` from a user-supplied string for request handling.
pub fn parse_task_id(raw: &str) -> TaskId {
    TaskId::from_string(raw)
}
