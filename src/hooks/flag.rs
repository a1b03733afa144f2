use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagStatus {
    // Ord derive gives ascending declaration order; declared so that
    // `max()` over a set of statuses yields the most restrictive one.
    Pending,
    Revise,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagContent {
    pub status: FlagStatus,
    pub message: String,
}

const FLAG_PREFIX: &str = ".holistic-review-pending-";

pub fn flag_path(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("{FLAG_PREFIX}{session_id}"))
}

pub fn write_flag(dir: &Path, session_id: &str, status: FlagStatus, message: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = flag_path(dir, session_id);
    let content = FlagContent {
        status,
        message: message.to_string(),
    };
    crate::lockfile::atomic_write(&path, serde_json::to_string(&content)?.as_bytes())
}

pub fn read_flag(path: &Path) -> Result<Option<FlagContent>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content).ok())
}

pub fn clear_flag(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// True when `path`'s modification time is more than `staleness_ms` old.
pub fn is_stale(path: &Path, staleness_ms: u64) -> Result<bool> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata.modified()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    Ok(age > Duration::from_millis(staleness_ms))
}

/// List every holistic-review flag file directly under `dir`.
pub fn list_flags(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut flags = Vec::new();
    if !dir.exists() {
        return Ok(flags);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(FLAG_PREFIX) {
                flags.push(entry.path());
            }
        }
    }
    Ok(flags)
}
