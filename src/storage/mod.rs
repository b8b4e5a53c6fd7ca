//! File persistence helpers
//!
//! Every file the coordinator and workers own is written through a temp
//! file that is fsynced and then renamed over the destination, so a crash
//! mid-write never leaves a truncated artifact behind.
//!
//! - [`durable_replace`] - rotate the current file to `<path>.old`, then install the new one
//! - [`write_atomic`] - replace without keeping a backup
//! - [`WorkerStats`] - per-worker cumulative contribution counters

pub mod stats;

pub use stats::WorkerStats;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O failure on a specific path
    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File exists but its content is unusable
    #[error("corrupt file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl StorageError {
    fn io(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Path of the rotation backup for `path` (`<path>.old`)
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".old");
    PathBuf::from(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StorageError::io("create_dir", parent, e))?;
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = File::create(path).map_err(|e| StorageError::io("create", path, e))?;
    file.write_all(bytes)
        .map_err(|e| StorageError::io("write", path, e))?;
    file.sync_all()
        .map_err(|e| StorageError::io("fsync", path, e))?;
    Ok(())
}

/// Replace `path` with `bytes`, keeping the previous content as `<path>.old`
///
/// The new content is fully written and fsynced before anything is renamed.
/// Any earlier backup is discarded. If the process dies at any point, either
/// `path` or `<path>.old` holds a complete file.
pub fn durable_replace(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    ensure_parent(path)?;
    let temp = temp_path(path);
    write_synced(&temp, bytes)?;

    if path.exists() {
        let backup = backup_path(path);
        if backup.exists() {
            fs::remove_file(&backup).map_err(|e| StorageError::io("remove", &backup, e))?;
        }
        fs::rename(path, &backup).map_err(|e| StorageError::io("rename", path, e))?;
    }

    fs::rename(&temp, path).map_err(|e| StorageError::io("rename", &temp, e))?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "File replaced");
    Ok(())
}

/// Replace `path` with `bytes` without keeping a backup
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    ensure_parent(path)?;
    let temp = temp_path(path);
    write_synced(&temp, bytes)?;
    fs::rename(&temp, path).map_err(|e| StorageError::io("rename", &temp, e))?;
    Ok(())
}

/// Read a file, returning `None` when it does not exist
pub fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io("read", path, e)),
    }
}

/// Read a whole file
pub fn read(path: &Path) -> StorageResult<Vec<u8>> {
    fs::read(path).map_err(|e| StorageError::io("read", path, e))
}
