// SPDX-License-Identifier: MIT

use thiserror::Error;
use toil_queue::QueueError;
use toil_resource::ResourceError;
use toil_storage::RepositoryError;

/// Error surfaced by an [`crate::Executor`]. Classified at the type level
/// so `handleTaskError` never has to string-sniff a message to decide
/// whether a failure is retryable.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("transient executor failure: {0}")]
    Transient(String),
    #[error("permanent executor failure: {0}")]
    Permanent(String),
    #[error("task exceeded its execution deadline")]
    DeadlineExceeded,
    #[error("task was cancelled")]
    Cancelled,
    #[error("pausing is not supported by this executor")]
    PauseUnsupported,
}

impl ExecutorError {
    /// Whether `handleTaskError` should requeue (true) or dead-letter
    /// (false) this failure, independent of the task's own retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutorError::Transient(_) | ExecutorError::DeadlineExceeded)
    }
}

/// Top-level engine error: everything a pool-level operation can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no executor registered for task type {0:?}")]
    NoExecutor(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("notifier buffer full, event dropped")]
    NotifierFull,
    #[error("timed out waiting for task completion")]
    WaitTimeout,
}
