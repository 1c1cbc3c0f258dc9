// SPDX-License-Identifier: MIT

//! Reference executor modeling a multi-round debate between simulated
//! participants. Same liveness shape as [`crate::llm::LlmCallExecutor`] but
//! with a longer default run time, exercising the `debate` task_type's
//! longer registered stuck threshold.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, sleep};
use toil_core::{ResourceRequirements, Task};
use toil_engine::{ExecContext, Executor, ExecutorError, ProgressReporter};

const DEFAULT_ROUNDS: u32 = 3;
const ROUND_SECONDS: u64 = 4;
const HEARTBEAT_TICK: Duration = Duration::from_secs(2);

#[derive(Debug, serde::Deserialize)]
struct DebatePayload {
    #[serde(default)]
    topic: String,
    #[serde(default = "default_rounds")]
    rounds: u32,
}

fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}

pub struct DebateExecutor;

#[async_trait]
impl Executor for DebateExecutor {
    async fn execute(&self, ctx: ExecContext, task: &Task, reporter: &ProgressReporter) -> Result<(), ExecutorError> {
        let payload: DebatePayload = if task.payload.is_null() {
            DebatePayload { topic: String::new(), rounds: DEFAULT_ROUNDS }
        } else {
            serde_json::from_value(task.payload.clone())
                .map_err(|e| ExecutorError::Permanent(format!("invalid debate payload: {e}")))?
        };

        for round in 1..=payload.rounds {
            let percent = (round as f64 / payload.rounds as f64) * 100.0;
            reporter
                .progress(percent, Some(format!("round {round}/{} on '{}'", payload.rounds, payload.topic)))
                .await
                .map_err(|e| ExecutorError::Transient(e.to_string()))?;

            let round_sleep = sleep(Duration::from_secs(ROUND_SECONDS));
            tokio::pin!(round_sleep);
            let mut ticks = interval(HEARTBEAT_TICK);
            loop {
                tokio::select! {
                    _ = &mut round_sleep => break,
                    _ = ctx.cancellation.cancelled() => return Err(ExecutorError::Cancelled),
                    _ = ticks.tick() => {
                        reporter.heartbeat().await.map_err(|e| ExecutorError::Transient(e.to_string()))?;
                    }
                }
            }
        }

        Ok(())
    }

    fn resource_requirements(&self) -> ResourceRequirements {
        ResourceRequirements { cpu_cores: 1.0, memory_mb: 768 }
    }
}
