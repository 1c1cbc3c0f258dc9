// SPDX-License-Identifier: MIT

//! The Task Queue: enqueue, claim, peek, requeue, dead-letter, and counters
//! over any [`toil_storage::Repository`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod cache;
mod error;
mod queue;

pub use error::QueueError;
pub use queue::TaskQueue;
