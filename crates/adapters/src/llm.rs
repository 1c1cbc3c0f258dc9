// SPDX-License-Identifier: MIT

//! Reference executor standing in for a long-running model call. This is
//! not a provider client — it simulates the liveness shape a real one
//! would have (periodic heartbeats while waiting on a remote response) so
//! the pool and stuck detector can be exercised end to end.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, sleep};
use toil_core::{ResourceRequirements, Task};
use toil_engine::{ExecContext, Executor, ExecutorError, ProgressReporter};

const DEFAULT_CALL_SECONDS: u64 = 5;
const HEARTBEAT_TICK: Duration = Duration::from_secs(2);

#[derive(Debug, serde::Deserialize)]
struct LlmPayload {
    #[serde(default)]
    prompt: String,
    #[serde(default = "default_call_seconds")]
    simulated_seconds: u64,
}

fn default_call_seconds() -> u64 {
    DEFAULT_CALL_SECONDS
}

pub struct LlmCallExecutor;

#[async_trait]
impl Executor for LlmCallExecutor {
    async fn execute(&self, ctx: ExecContext, task: &Task, reporter: &ProgressReporter) -> Result<(), ExecutorError> {
        let payload: LlmPayload = if task.payload.is_null() {
            LlmPayload { prompt: String::new(), simulated_seconds: DEFAULT_CALL_SECONDS }
        } else {
            serde_json::from_value(task.payload.clone())
                .map_err(|e| ExecutorError::Permanent(format!("invalid llm_call payload: {e}")))?
        };

        let mut fields = std::collections::HashMap::new();
        fields.insert("prompt_chars".to_string(), serde_json::json!(payload.prompt.len()));
        reporter.log("info", "starting model call", fields).await.map_err(|e| ExecutorError::Transient(e.to_string()))?;

        let call = sleep(Duration::from_secs(payload.simulated_seconds));
        tokio::pin!(call);
        let mut ticks = interval(HEARTBEAT_TICK);

        loop {
            tokio::select! {
                _ = &mut call => break,
                _ = ctx.cancellation.cancelled() => return Err(ExecutorError::Cancelled),
                _ = ticks.tick() => {
                    reporter.heartbeat().await.map_err(|e| ExecutorError::Transient(e.to_string()))?;
                }
            }
        }

        Ok(())
    }

    fn resource_requirements(&self) -> ResourceRequirements {
        ResourceRequirements { cpu_cores: 0.5, memory_mb: 512 }
    }
}
