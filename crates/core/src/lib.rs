// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! toil-core: data model for the durable background task execution engine.
//!
//! This crate has no knowledge of the repository, the resource monitor, or
//! the worker pool — it defines the shapes those components agree on:
//! [`Task`], [`Priority`], [`TaskStatus`], [`ResourceSnapshot`], and
//! [`ExecutionHistoryEvent`].

pub mod macros;

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod priority;
pub mod snapshot;
pub mod status;
pub mod task;
pub mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{TaskRuntimeConfig, DEFAULT_TIMEOUT_SECONDS};
pub use error::CoreError;
pub use event::{EventType, ExecutionHistoryEvent};
pub use id::{IdBuf, ID_MAX_LEN};
pub use priority::Priority;
pub use snapshot::{ProcessState, ResourceSnapshot};
pub use status::TaskStatus;
pub use task::{ResourceRequirements, Task, TaskConfig, TaskId};
pub use worker::WorkerId;

#[cfg(any(test, feature = "test-support"))]
pub use snapshot::ResourceSnapshotBuilder;
#[cfg(any(test, feature = "test-support"))]
pub use task::TaskBuilder;
