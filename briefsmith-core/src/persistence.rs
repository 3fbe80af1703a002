//! File output for briefs, registries, reports and run snapshots.
//!
//! Every write goes to a temporary sibling first and is renamed into place, so
//! a crash mid-run never leaves a truncated brief behind.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};

/// JSON layout for written artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonStyle {
    #[default]
    Pretty,
    Compact,
}

impl JsonStyle {
    pub fn from_pretty(pretty: bool) -> Self {
        if pretty { Self::Pretty } else { Self::Compact }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Atomically write `data` to `path`, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

/// Serialize `data` as JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, data: &T, style: JsonStyle) -> io::Result<()> {
    let json = match style {
        JsonStyle::Pretty => serde_json::to_vec_pretty(data),
        JsonStyle::Compact => serde_json::to_vec(data),
    }
    .map_err(io::Error::other)?;
    atomic_write(path, &json)
}

/// Load JSON from `path`. `Ok(None)` when the file does not exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
