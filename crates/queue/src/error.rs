// SPDX-License-Identifier: MIT

use thiserror::Error;
use toil_storage::RepositoryError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid task: {0}")]
    Invalid(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
