// SPDX-License-Identifier: MIT

//! Periodic snapshot persistence for crash recovery.
//!
//! A snapshot is the complete task table plus execution history at a
//! point in time. On startup the daemon loads the most recent snapshot
//! instead of replaying from empty, the way the teacher's daemon loads a
//! WAL snapshot before replaying outstanding events.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use toil_core::{ExecutionHistoryEvent, Task};

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The portion of repository state worth persisting across restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryState {
    pub tasks: Vec<Task>,
    pub history: Vec<ExecutionHistoryEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    created_at_epoch_ms: u64,
    state: RepositoryState,
}

/// Write `state` to `path` atomically: serialize to a sibling `.tmp` file,
/// then rename over the destination so a crash mid-write never corrupts
/// the previous snapshot.
pub fn save_snapshot(path: &Path, state: &RepositoryState) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let created_at_epoch_ms =
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    let file = SnapshotFile { version: CURRENT_SNAPSHOT_VERSION, created_at_epoch_ms, state: state.clone() };
    let bytes = serde_json::to_vec_pretty(&file)?;

    let tmp_path: PathBuf = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a previously saved snapshot, or `None` if `path` doesn't exist yet
/// (first-ever startup).
pub fn load_snapshot(path: &Path) -> Result<Option<RepositoryState>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let file: SnapshotFile = serde_json::from_slice(&bytes)?;
    Ok(Some(file.state))
}
