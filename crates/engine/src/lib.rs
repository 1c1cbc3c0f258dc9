// SPDX-License-Identifier: MIT

//! The Worker Pool: executor registry, worker lifecycle, autoscaling,
//! stuck-detection loop, heartbeat loop, and graceful shutdown.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod error;
mod events;
mod executor;
mod pool;
mod reporter;
mod worker;

pub use error::{EngineError, ExecutorError};
pub use events::{ChannelNotifier, EventEnvelope, NullNotifier, Notifier};
pub use executor::{ExecContext, Executor, ExecutorRegistry};
pub use pool::{PoolConfig, WorkerPool};
pub use reporter::ProgressReporter;
pub use worker::{WorkerState, WorkerStats};
