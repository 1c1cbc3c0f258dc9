// SPDX-License-Identifier: MIT

//! Shared error type for the core data model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid task: {0}")]
    Invalid(String),
}
