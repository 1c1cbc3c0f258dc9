// SPDX-License-Identifier: MIT

//! Reference executor for a short-lived embedding computation. No
//! heartbeat ticking is needed since the call is expected to finish well
//! inside the `embedding` task_type's tight default stuck threshold.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use toil_core::{ResourceRequirements, Task};
use toil_engine::{ExecContext, Executor, ExecutorError, ProgressReporter};

const DEFAULT_LATENCY_MILLIS: u64 = 200;

#[derive(Debug, serde::Deserialize)]
struct EmbeddingPayload {
    #[serde(default)]
    text: String,
    #[serde(default = "default_latency")]
    simulated_latency_ms: u64,
}

fn default_latency() -> u64 {
    DEFAULT_LATENCY_MILLIS
}

pub struct EmbeddingExecutor;

#[async_trait]
impl Executor for EmbeddingExecutor {
    async fn execute(&self, ctx: ExecContext, task: &Task, reporter: &ProgressReporter) -> Result<(), ExecutorError> {
        let payload: EmbeddingPayload = if task.payload.is_null() {
            EmbeddingPayload { text: String::new(), simulated_latency_ms: DEFAULT_LATENCY_MILLIS }
        } else {
            serde_json::from_value(task.payload.clone())
                .map_err(|e| ExecutorError::Permanent(format!("invalid embedding payload: {e}")))?
        };

        if payload.text.is_empty() {
            return Err(ExecutorError::Permanent("empty embedding input".to_string()));
        }

        tokio::select! {
            _ = sleep(Duration::from_millis(payload.simulated_latency_ms)) => {}
            _ = ctx.cancellation.cancelled() => return Err(ExecutorError::Cancelled),
        }

        reporter.progress(100.0, None).await.map_err(|e| ExecutorError::Transient(e.to_string()))?;
        Ok(())
    }

    fn resource_requirements(&self) -> ResourceRequirements {
        ResourceRequirements { cpu_cores: 0.25, memory_mb: 128 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use toil_core::{FakeClock, TaskConfig, WorkerId};
    use toil_engine::NullNotifier;
    use toil_storage::{InMemoryRepository, Repository};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn embeds_nonempty_text() {
        let config = TaskConfig::new("embedding").payload(serde_json::json!({"text": "hello", "simulated_latency_ms": 0}));
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let repository: Arc<InMemoryRepository<FakeClock>> = Arc::new(InMemoryRepository::with_clock(FakeClock::new()));
        repository.create(task.clone()).await.unwrap();
        let reporter = ProgressReporter::new(task.id, WorkerId::new("w1"), repository, Arc::new(NullNotifier));
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: CancellationToken::new() };

        let result = EmbeddingExecutor.execute(ctx, &task, &reporter).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let config = TaskConfig::new("embedding").payload(serde_json::json!({"text": ""}));
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let repository: Arc<InMemoryRepository<FakeClock>> = Arc::new(InMemoryRepository::with_clock(FakeClock::new()));
        repository.create(task.clone()).await.unwrap();
        let reporter = ProgressReporter::new(task.id, WorkerId::new("w1"), repository, Arc::new(NullNotifier));
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: CancellationToken::new() };

        let result = EmbeddingExecutor.execute(ctx, &task, &reporter).await;
        assert!(matches!(result, Err(ExecutorError::Permanent(_))));
    }
}
