//! Raw JSON snapshots written before a record is committed.
//!
//! Snapshots exist for manual forward recovery and are never read back.

use crate::error::{HoardError, Result};
use crate::model::RawStatus;
use std::fs;
use std::path::PathBuf;

pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    /// Create the writer, making `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| HoardError::path_error("create", &dir, e))?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path_for(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Dump `status` to `<dir>/<id>.json`, replacing any earlier dump.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write(&self, status: &RawStatus) -> Result<PathBuf> {
        let path = self.path_for(status.id);
        let json = serde_json::to_vec(status)?;
        fs::write(&path, json).map_err(|e| HoardError::path_error("write", &path, e))?;
        Ok(path)
    }
}
