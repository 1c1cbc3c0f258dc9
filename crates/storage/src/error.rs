// SPDX-License-Identifier: MIT

use thiserror::Error;
use toil_core::TaskId;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task is nil")]
    NilTask,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
