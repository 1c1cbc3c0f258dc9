// SPDX-License-Identifier: MIT

//! Host and per-task resource monitoring.
//!
//! Samples host-wide and per-process resource usage, retains a short
//! in-memory window per monitored task for the stuck detector, and
//! persists every sample through a [`toil_storage::Repository`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod cache;
mod error;
mod monitor;
mod system;

pub use cache::TtlCache;
pub use error::ResourceError;
pub use monitor::{ResourceMonitor, SysinfoResourceMonitor};
pub use system::SystemResources;
