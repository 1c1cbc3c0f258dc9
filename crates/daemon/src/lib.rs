// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! toil-daemon: wires the repository, resource monitor, and worker pool
//! together behind a long-running process, and serves the newline-delimited
//! JSON protocol other processes use to submit and inspect tasks.

pub mod env;
pub mod protocol;
pub mod server;

use std::sync::Arc;
use toil_engine::WorkerPool;
use toil_resource::ResourceMonitor;
use toil_storage::Repository;

/// Register the reference executors from `toil-adapters` under their
/// conventional task_type names. Callers that only need a subset are free
/// to call `WorkerPool::register_executor` directly instead.
pub fn register_default_executors<R: Repository, M: ResourceMonitor>(pool: &WorkerPool<R, M>) {
    pool.register_executor("command", Arc::new(toil_adapters::ShellCommandExecutor));
    pool.register_executor("llm_call", Arc::new(toil_adapters::LlmCallExecutor));
    pool.register_executor("debate", Arc::new(toil_adapters::DebateExecutor));
    pool.register_executor("embedding", Arc::new(toil_adapters::EmbeddingExecutor));
}
