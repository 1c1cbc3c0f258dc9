// SPDX-License-Identifier: MIT

//! The reporter an executor uses to surface progress, liveness, and
//! diagnostic output back through the repository and event stream.

use crate::events::Notifier;
use std::collections::HashMap;
use std::sync::Arc;
use toil_core::{EventType, ExecutionHistoryEvent, TaskId, WorkerId};
use toil_storage::{Repository, Result as RepoResult};

/// Bound to a single task/worker pair for the lifetime of one `executeTask`
/// call.
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: TaskId,
    worker_id: WorkerId,
    repository: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
}

impl ProgressReporter {
    pub fn new(task_id: TaskId, worker_id: WorkerId, repository: Arc<dyn Repository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { task_id, worker_id, repository, notifier }
    }

    fn event(&self, event_type: EventType) -> ExecutionHistoryEvent {
        ExecutionHistoryEvent::new(self.task_id, event_type, std::time::SystemTime::now()).with_worker(self.worker_id.clone())
    }

    /// Persists progress and, per the PROGRESS-implies-HEARTBEAT contract,
    /// also refreshes `last_heartbeat` — progress reporting counts as
    /// liveness even between scheduler heartbeat ticks.
    pub async fn progress(&self, percent: f64, message: Option<String>) -> RepoResult<()> {
        self.repository.update_progress(&self.task_id, percent, message.clone()).await?;
        self.repository.update_heartbeat(&self.task_id).await?;
        let mut event = self.event(EventType::Progress);
        if let Some(message) = message {
            event = event.with_data("message", message);
        }
        event = event.with_data("percent", percent);
        crate::events::publish_routed(self.notifier.as_ref(), event).await;
        Ok(())
    }

    pub async fn heartbeat(&self) -> RepoResult<()> {
        self.repository.update_heartbeat(&self.task_id).await?;
        crate::events::publish_routed(self.notifier.as_ref(), self.event(EventType::Heartbeat)).await;
        Ok(())
    }

    pub async fn checkpoint(&self, bytes: Vec<u8>) -> RepoResult<()> {
        self.repository.save_checkpoint(&self.task_id, bytes).await
    }

    /// Persists the executor's final output text, for task types submitted
    /// with `config.capture_output` set. The executor decides what counts
    /// as output and when to call this; the engine never inspects it.
    pub async fn capture_output(&self, output: String) -> RepoResult<()> {
        self.repository.save_output(&self.task_id, output).await
    }

    pub async fn metrics(&self, data: HashMap<String, serde_json::Value>) -> RepoResult<()> {
        let mut event = self.event(EventType::Resource);
        event.data = data;
        crate::events::publish_routed(self.notifier.as_ref(), event).await;
        Ok(())
    }

    pub async fn log(&self, level: &str, message: &str, fields: HashMap<String, serde_json::Value>) -> RepoResult<()> {
        let mut event = self.event(EventType::Log).with_data("level", level).with_data("message", message);
        for (key, value) in fields {
            event = event.with_data(key, value);
        }
        self.repository.log_event(event.clone()).await?;
        crate::events::publish_routed(self.notifier.as_ref(), event).await;
        Ok(())
    }
}
