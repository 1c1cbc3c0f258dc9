// SPDX-License-Identifier: MIT

//! The `Executor` trait: the extension point task types plug into.

use crate::error::ExecutorError;
use crate::reporter::ProgressReporter;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_core::{ResourceRequirements, Task, TaskId, WorkerId};

/// Execution context handed to an executor: identity plus a cancellation
/// signal derived from the worker's own stop signal (and from
/// `config.timeout_seconds` unless the task is `endless`).
#[derive(Clone)]
pub struct ExecContext {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub cancellation: CancellationToken,
}

impl ExecContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, ctx: ExecContext, task: &Task, reporter: &ProgressReporter) -> Result<(), ExecutorError>;

    fn can_pause(&self) -> bool {
        false
    }

    async fn pause(&self, _ctx: &ExecContext, _task: &Task) -> Result<Vec<u8>, ExecutorError> {
        Err(ExecutorError::PauseUnsupported)
    }

    async fn resume(&self, _ctx: ExecContext, _task: &Task, _checkpoint: Vec<u8>) -> Result<(), ExecutorError> {
        Err(ExecutorError::PauseUnsupported)
    }

    async fn cancel(&self, ctx: &ExecContext, _task: &Task) -> Result<(), ExecutorError> {
        ctx.cancellation.cancel();
        Ok(())
    }

    fn resource_requirements(&self) -> ResourceRequirements {
        ResourceRequirements::default()
    }
}

/// Maps task_type -> executor. Registration is atomic and permitted after
/// the pool has started.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_type: impl Into<String>, executor: Arc<dyn Executor>) {
        self.executors.write().insert(task_type.into(), executor);
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn Executor>> {
        self.executors.read().get(task_type).cloned()
    }
}
