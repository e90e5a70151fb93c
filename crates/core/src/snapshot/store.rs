//! Durable snapshot slot per pipeline.

use crate::store::{self, StoreResult, StoreError};
use pr_protocol::Snapshot;
use std::fs::File;
use std::path::{Path, PathBuf};

/// File name of a captured snapshot inside the pipeline's snapshot directory.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Holds at most one captured snapshot per pipeline under `<data-dir>/snapshots`.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Path of the snapshot record for `pipeline`.
    pub fn snapshot_file(&self, pipeline: &str) -> PathBuf {
        self.root.join(pipeline).join(SNAPSHOT_FILE)
    }

    pub fn exists(&self, pipeline: &str) -> bool {
        self.snapshot_file(pipeline).is_file()
    }

    /// Persist `snapshot`, replacing any previous one atomically.
    pub fn save(&self, snapshot: &Snapshot) -> StoreResult<()> {
        store::write_record(&self.snapshot_file(&snapshot.pipeline), snapshot)
    }

    /// Open the stored snapshot for reading, if one exists.
    pub fn open(&self, pipeline: &str) -> StoreResult<Option<File>> {
        let path = self.snapshot_file(pipeline);
        match File::open(&path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Remove the stored snapshot. Returns whether one existed.
    pub fn delete(&self, pipeline: &str) -> StoreResult<bool> {
        store::remove_record(&self.snapshot_file(pipeline))
    }
}
