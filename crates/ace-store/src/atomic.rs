//! Write-to-temporary-then-rename file replacement.
//!
//! The temporary file is created in the destination directory so the final
//! rename never crosses a filesystem boundary. A crash at any point leaves
//! either the previous file or the new one, never a partial write.

use std::{
    fs,
    io::Write,
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use ace_contracts::error::{AceError, AceResult};

pub(crate) fn io_error(action: &str, path: &Path, err: impl std::fmt::Display) -> AceError {
    AceError::storage(format!("failed to {action} {}: {err}", path.display()))
}

/// Atomically replace `path` with `contents`, creating parent directories.
pub fn write_atomic(path: &Path, contents: &[u8]) -> AceResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| io_error("create directory", parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| io_error("create temporary file in", parent, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.flush())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| io_error("write temporary file for", path, e))?;
    tmp.persist(path).map_err(|e| io_error("replace", path, e.error))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> AceResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| io_error("serialize", path, e))?;
    write_atomic(path, &bytes)
}

/// Read and deserialize a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> AceResult<T> {
    let raw = fs::read_to_string(path).map_err(|e| io_error("read", path, e))?;
    serde_json::from_str(&raw).map_err(|e| io_error("parse", path, e))
}
