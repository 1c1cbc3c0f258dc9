// SPDX-License-Identifier: MIT

//! Per-task runtime configuration carried on [`crate::Task::config`].

use serde::{Deserialize, Serialize};

/// Per-invocation timeout used when the task is not `endless`.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30 * 60;

/// Runtime behavior flags for a task, set at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRuntimeConfig {
    /// Open-ended lifetime: heartbeat-based stuck detection is bypassed in
    /// favor of the endless-only rules (zombie / memory / no-activity).
    #[serde(default)]
    pub endless: bool,
    /// Per-invocation timeout. Ignored for endless tasks. Defaults to
    /// [`DEFAULT_TIMEOUT_SECONDS`] when zero.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Override for the stuck detector's heartbeat threshold. Zero means
    /// "use the task_type's registered default" (or "disabled" when the
    /// task is also `endless`).
    #[serde(default)]
    pub stuck_threshold_seconds: u64,
    /// When true and the task completes successfully, the executor's
    /// final output text is written to `Task::output`.
    #[serde(default)]
    pub capture_output: bool,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl Default for TaskRuntimeConfig {
    fn default() -> Self {
        Self {
            endless: false,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            stuck_threshold_seconds: 0,
            capture_output: false,
        }
    }
}

impl TaskRuntimeConfig {
    pub fn endless() -> Self {
        Self { endless: true, stuck_threshold_seconds: 0, ..Default::default() }
    }
}
