// SPDX-License-Identifier: MIT

//! Task lifecycle status.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`crate::Task`]. See the state machine in the
/// project design notes: PENDING is the initial state; COMPLETED, FAILED,
/// CANCELLED, and DEAD_LETTER are terminal. STUCK is non-terminal — the
/// scheduler never auto-transitions a stuck task onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Stuck,
    DeadLetter,
    Paused,
}

impl TaskStatus {
    /// Terminal states never transition further: COMPLETED, FAILED,
    /// CANCELLED, DEAD_LETTER. STUCK and PAUSED are deliberately excluded.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::DeadLetter
        )
    }

    /// `worker_id` is non-nil iff status is RUNNING or PAUSED.
    pub fn holds_worker(self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Paused)
    }
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Stuck => "stuck",
        DeadLetter => "dead_letter",
        Paused => "paused",
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            "stuck" => Ok(TaskStatus::Stuck),
            "dead_letter" | "dead-letter" => Ok(TaskStatus::DeadLetter),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(crate::error::CoreError::Invalid(format!("unknown status '{other}'"))),
        }
    }
}
