// SPDX-License-Identifier: MIT

//! Runs a task's `payload` as a subprocess.
//!
//! Expects `payload` shaped `{"command": "<program>", "args": ["..."], "cwd": "..."}`.
//! `args` and `cwd` are optional. Stdout/stderr are captured and streamed
//! into the reporter's log stream line by line; the child is killed when
//! the execution context is cancelled.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use toil_core::{ResourceRequirements, Task};
use toil_engine::{ExecContext, Executor, ExecutorError, ProgressReporter};

pub struct ShellCommandExecutor;

#[derive(Debug, serde::Deserialize)]
struct ShellPayload {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
}

#[async_trait]
impl Executor for ShellCommandExecutor {
    async fn execute(&self, ctx: ExecContext, task: &Task, reporter: &ProgressReporter) -> Result<(), ExecutorError> {
        let payload: ShellPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| ExecutorError::Permanent(format!("invalid shell payload: {e}")))?;
        if payload.command.trim().is_empty() {
            return Err(ExecutorError::Permanent("empty shell command".to_string()));
        }

        let mut process = Command::new(&payload.command);
        process.args(&payload.args).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(cwd) = &payload.cwd {
            process.current_dir(cwd);
        }

        let mut child = process
            .spawn()
            .map_err(|e| ExecutorError::Permanent(format!("failed to spawn '{}': {e}", payload.command)))?;

        let stdout = child.stdout.take().map(BufReader::new);
        let stderr = child.stderr.take().map(BufReader::new);
        let capture_output = task.config.capture_output;
        let captured = Arc::new(AsyncMutex::new(String::new()));

        let stdout_handle = stdout.map(|mut out| {
            let reporter = reporter_handle(reporter);
            let captured = captured.clone();
            tokio::spawn(async move {
                let mut line = String::new();
                while out.read_line(&mut line).await.unwrap_or(0) > 0 {
                    let _ = reporter.log("info", line.trim_end(), Default::default()).await;
                    if capture_output {
                        let mut buf = captured.lock().await;
                        buf.push_str(line.trim_end());
                        buf.push('\n');
                    }
                    line.clear();
                }
            })
        });
        let stderr_handle = stderr.map(|mut err| {
            let reporter = reporter_handle(reporter);
            tokio::spawn(async move {
                let mut line = String::new();
                while err.read_line(&mut line).await.unwrap_or(0) > 0 {
                    let _ = reporter.log("warn", line.trim_end(), Default::default()).await;
                    line.clear();
                }
            })
        });

        reporter.heartbeat().await.map_err(|e| ExecutorError::Transient(e.to_string()))?;

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| ExecutorError::Transient(e.to_string()))?,
            _ = ctx.cancellation.cancelled() => {
                let _ = child.kill().await;
                return Err(ExecutorError::Cancelled);
            }
        };

        // Drain both streaming tasks before reading `captured`: the child
        // exiting doesn't guarantee our reader has caught up with the pipe.
        if let Some(handle) = stdout_handle {
            let _ = handle.await;
        }
        if let Some(handle) = stderr_handle {
            let _ = handle.await;
        }

        if status.success() {
            if capture_output {
                let output = captured.lock().await.clone();
                reporter.capture_output(output).await.map_err(|e| ExecutorError::Transient(e.to_string()))?;
            }
            Ok(())
        } else {
            Err(ExecutorError::Permanent(format!("command exited with status {status}")))
        }
    }

    fn resource_requirements(&self) -> ResourceRequirements {
        ResourceRequirements { cpu_cores: 1.0, memory_mb: 256 }
    }
}

/// `ProgressReporter` is borrowed for the lifetime of `execute`; the
/// streaming tasks need an owned handle, so clone the notifier/repository
/// pair into a fresh reporter bound to the same task/worker.
fn reporter_handle(reporter: &ProgressReporter) -> ProgressReporter {
    reporter.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use toil_core::{FakeClock, TaskConfig, WorkerId};
    use toil_engine::NullNotifier;
    use toil_storage::{InMemoryRepository, Repository};
    use tokio_util::sync::CancellationToken;

    async fn reporter_for(task: &toil_core::Task) -> ProgressReporter {
        let (reporter, _repository) = reporter_and_repo_for(task).await;
        reporter
    }

    async fn reporter_and_repo_for(task: &toil_core::Task) -> (ProgressReporter, Arc<InMemoryRepository<FakeClock>>) {
        let repository: Arc<InMemoryRepository<FakeClock>> = Arc::new(InMemoryRepository::with_clock(FakeClock::new()));
        repository.create(task.clone()).await.unwrap();
        let reporter = ProgressReporter::new(task.id, WorkerId::new("w1"), repository.clone(), Arc::new(NullNotifier));
        (reporter, repository)
    }

    #[tokio::test]
    async fn runs_a_successful_command() {
        let mut config = TaskConfig::new("command");
        config = config.payload(serde_json::json!({"command": "true"}));
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let reporter = reporter_for(&task).await;
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: CancellationToken::new() };

        let result = ShellCommandExecutor.execute(ctx, &task, &reporter).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn captures_stdout_as_output_when_configured() {
        let mut config = TaskConfig::new("command");
        config = config.payload(serde_json::json!({"command": "echo", "args": ["hello"]}));
        config = config.config(toil_core::TaskRuntimeConfig { capture_output: true, ..Default::default() });
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let (reporter, repository) = reporter_and_repo_for(&task).await;
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: CancellationToken::new() };

        let result = ShellCommandExecutor.execute(ctx, &task, &reporter).await;
        assert!(result.is_ok());

        let stored = repository.get_by_id(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.output.as_deref(), Some("hello\n"));
    }

    #[tokio::test]
    async fn does_not_capture_output_when_not_configured() {
        let mut config = TaskConfig::new("command");
        config = config.payload(serde_json::json!({"command": "echo", "args": ["hello"]}));
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let (reporter, repository) = reporter_and_repo_for(&task).await;
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: CancellationToken::new() };

        let result = ShellCommandExecutor.execute(ctx, &task, &reporter).await;
        assert!(result.is_ok());

        let stored = repository.get_by_id(&task.id).await.unwrap().unwrap();
        assert!(stored.output.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_permanent_failure() {
        let mut config = TaskConfig::new("command");
        config = config.payload(serde_json::json!({"command": "false"}));
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let reporter = reporter_for(&task).await;
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: CancellationToken::new() };

        let result = ShellCommandExecutor.execute(ctx, &task, &reporter).await;
        assert!(matches!(result, Err(ExecutorError::Permanent(_))));
    }

    #[tokio::test]
    async fn missing_command_is_a_permanent_failure() {
        let config = TaskConfig::new("command");
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let reporter = reporter_for(&task).await;
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: CancellationToken::new() };

        let result = ShellCommandExecutor.execute(ctx, &task, &reporter).await;
        assert!(matches!(result, Err(ExecutorError::Permanent(_))));
    }

    #[tokio::test]
    async fn cancellation_kills_a_long_running_command() {
        let mut config = TaskConfig::new("command");
        config = config.payload(serde_json::json!({"command": "sleep", "args": ["5"]}));
        let task = toil_core::Task::new(config, std::time::SystemTime::UNIX_EPOCH);
        let reporter = reporter_for(&task).await;
        let cancellation = CancellationToken::new();
        let ctx = ExecContext { task_id: task.id, worker_id: WorkerId::new("w1"), cancellation: cancellation.clone() };

        cancellation.cancel();
        let result = ShellCommandExecutor.execute(ctx, &task, &reporter).await;
        assert!(matches!(result, Err(ExecutorError::Cancelled)));
    }
}
