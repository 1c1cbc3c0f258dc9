// SPDX-License-Identifier: MIT

use thiserror::Error;
use toil_core::TaskId;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("process not found: pid {0}")]
    NotFound(u32),
    #[error("already monitoring task {0}")]
    AlreadyMonitoring(TaskId),
    #[error("not monitoring task {0}")]
    NotMonitoring(TaskId),
}
