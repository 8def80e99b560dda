//! JSON files for snapshots and action scripts.
//!
//! A missing snapshot file loads as the empty snapshot so a fresh replay
//! can start from nothing.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{JerichoResult, PersistError};
use crate::kernel::{Action, Snapshot};

fn read_json<T: DeserializeOwned>(path: &Path, what: &'static str) -> JerichoResult<T> {
    let content = std::fs::read_to_string(path).map_err(|e| PersistError::Read {
        what,
        path: path.display().to_string(),
        source: e,
    })?;
    let value = serde_json::from_str(&content).map_err(|e| PersistError::Json {
        what,
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(value)
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &'static str) -> JerichoResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| PersistError::Json {
        what,
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PersistError::Write {
            what,
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| PersistError::Write {
        what,
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> JerichoResult<Snapshot> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no snapshot yet, starting empty");
        return Ok(Snapshot::default());
    }
    read_json(path, "snapshot")
}

pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> JerichoResult<()> {
    write_json(path, snapshot, "snapshot")
}

/// Load a JSON array of actions.
pub fn load_actions(path: &Path) -> JerichoResult<Vec<Action>> {
    read_json(path, "action script")
}
