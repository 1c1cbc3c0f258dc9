// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;
use toil_engine::PoolConfig;

/// Resolve the Unix socket path: `TOIL_SOCKET_PATH` > `XDG_RUNTIME_DIR`/toil.sock > `~/.local/state/toil/toil.sock`.
pub fn socket_path() -> PathBuf {
    if let Ok(path) = std::env::var("TOIL_SOCKET_PATH") {
        return PathBuf::from(path);
    }
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir).join("toil.sock");
    }
    state_dir().join("toil.sock")
}

/// Resolve the state directory used for snapshot persistence: `TOIL_STATE_DIR` > `dirs::state_dir()`/toil > `~/.local/state/toil`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TOIL_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::state_dir().unwrap_or_else(|| PathBuf::from(".local/state")).join("toil")
}

pub fn snapshot_path() -> PathBuf {
    state_dir().join("snapshot.json")
}

/// Snapshot persistence cadence (default 30s, configurable via `TOIL_SNAPSHOT_INTERVAL_MS`).
pub fn snapshot_interval() -> Duration {
    std::env::var("TOIL_SNAPSHOT_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// Graceful shutdown drain timeout (default from `PoolConfig`, overridable via `TOIL_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout(default: &PoolConfig) -> Duration {
    std::env::var("TOIL_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default.graceful_shutdown_time)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse::<usize>().ok())
}

/// Build a `PoolConfig` from defaults, overridden by `TOIL_MIN_WORKERS`/`TOIL_MAX_WORKERS`.
pub fn pool_config() -> PoolConfig {
    let mut config = PoolConfig::default();
    if let Some(min) = env_usize("TOIL_MIN_WORKERS") {
        config.min_workers = min;
    }
    if let Some(max) = env_usize("TOIL_MAX_WORKERS") {
        config.max_workers = max;
    }
    config
}
