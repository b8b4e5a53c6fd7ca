//! Per-worker contribution counters
//!
//! One file per worker identity under a stats directory, each holding a
//! single decimal integer: the cumulative number of positions that worker
//! added to the master book.

use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::sanitize_filename;

use super::{read_optional, write_atomic, StorageError, StorageResult};

/// Cumulative contribution counters keyed by worker identity
#[derive(Debug, Clone)]
pub struct WorkerStats {
    dir: PathBuf,
}

impl WorkerStats {
    /// Create a counter store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the counter files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Counter file for `worker`, always a direct child of the stats directory
    fn path_for(&self, worker: &str) -> PathBuf {
        let name = sanitize_filename(worker.trim());
        match name.as_str() {
            "" | "." | ".." => self.dir.join("unknown"),
            _ => self.dir.join(name),
        }
    }

    /// Current total for `worker` (0 when unknown)
    pub fn get(&self, worker: &str) -> StorageResult<i64> {
        let path = self.path_for(worker);
        match read_optional(&path)? {
            None => Ok(0),
            Some(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                text.trim().parse().map_err(|_| StorageError::Corrupt {
                    path,
                    reason: format!("expected a decimal integer, found {:?}", text.trim()),
                })
            }
        }
    }

    /// Add `delta` to the worker's total and return the new total
    pub fn add(&self, worker: &str, delta: i64) -> StorageResult<i64> {
        let total = self.get(worker)? + delta;
        write_atomic(&self.path_for(worker), total.to_string().as_bytes())?;
        Ok(total)
    }

    /// All known workers and their totals
    pub fn all(&self) -> StorageResult<Vec<(String, i64)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Io {
                    operation: "read_dir",
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut totals = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".tmp") {
                continue;
            }
            totals.push((name.clone(), self.get(&name)?));
        }
        totals.sort();
        Ok(totals)
    }
}
