//! Source offset checkpointing.
//!
//! The OffsetTracker owns `runInfo/offset.json`, a single record holding the
//! last position committed by the running pipeline's source together with the
//! pipeline revision it belongs to. Tokens are opaque here; only the source
//! stage knows what they mean.

use crate::error::{RunError, RunResult};
use crate::store;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name of the offset record inside the run info directory.
pub const OFFSET_FILE: &str = "offset.json";

/// Durable offset record.
///
/// `offset == None` means no progress has been committed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetRecord {
    pub pipeline: Option<String>,
    pub revision: Option<String>,
    pub offset: Option<String>,
}

impl OffsetRecord {
    fn is_bound_to(&self, pipeline: &str, revision: &str) -> bool {
        self.pipeline.as_deref() == Some(pipeline) && self.revision.as_deref() == Some(revision)
    }
}

/// Owns the durable source offset.
pub struct OffsetTracker {
    offset_file: PathBuf,
    current: Mutex<OffsetRecord>,
}

impl OffsetTracker {
    pub fn new(run_info_dir: &Path) -> Self {
        Self {
            offset_file: run_info_dir.join(OFFSET_FILE),
            current: Mutex::new(OffsetRecord::default()),
        }
    }

    /// Path of the durable offset record.
    pub fn offset_file(&self) -> &Path {
        &self.offset_file
    }

    /// Load the persisted offset, if any.
    pub fn init(&self) -> RunResult<OffsetRecord> {
        let record = store::read_record::<OffsetRecord>(&self.offset_file)?.unwrap_or_default();
        let mut current = self.current.lock().map_err(|_| RunError::LockPoisoned)?;
        *current = record.clone();
        Ok(record)
    }

    /// Last committed token, or `None` if no progress was committed.
    pub fn get_offset(&self) -> RunResult<Option<String>> {
        let current = self.current.lock().map_err(|_| RunError::LockPoisoned)?;
        Ok(current.offset.clone())
    }

    /// Full offset record including the pipeline revision it belongs to.
    pub fn get_record(&self) -> RunResult<OffsetRecord> {
        let current = self.current.lock().map_err(|_| RunError::LockPoisoned)?;
        Ok(current.clone())
    }

    /// Offset a new run of `pipeline`@`revision` must resume from.
    ///
    /// Returns the stored token when the record belongs to the same pipeline
    /// revision. Otherwise the record is rebound to it with no progress, so a
    /// different revision always starts from the beginning.
    pub fn resume_from(&self, pipeline: &str, revision: &str) -> RunResult<Option<String>> {
        let mut current = self.current.lock().map_err(|_| RunError::LockPoisoned)?;
        if current.is_bound_to(pipeline, revision) {
            return Ok(current.offset.clone());
        }

        let rebound = OffsetRecord {
            pipeline: Some(pipeline.to_string()),
            revision: Some(revision.to_string()),
            offset: None,
        };
        store::write_record(&self.offset_file, &rebound)?;
        tracing::info!(
            pipeline = pipeline,
            revision = revision,
            previous_pipeline = ?current.pipeline,
            previous_revision = ?current.revision,
            "Offset rebound to new pipeline revision, starting without progress"
        );
        *current = rebound;
        Ok(None)
    }

    /// Persist `token` as the committed position.
    ///
    /// The record on disk is replaced atomically; on failure the previous
    /// token remains both on disk and in memory.
    pub fn commit_offset(&self, token: &str) -> RunResult<()> {
        let mut current = self.current.lock().map_err(|_| RunError::LockPoisoned)?;
        let next = OffsetRecord {
            offset: Some(token.to_string()),
            ..current.clone()
        };
        store::write_record(&self.offset_file, &next)?;
        tracing::trace!(offset = token, "Offset committed");
        *current = next;
        Ok(())
    }

    /// Clear the committed position back to no progress.
    ///
    /// Callers must ensure no run is active.
    pub fn reset_offset(&self) -> RunResult<()> {
        let mut current = self.current.lock().map_err(|_| RunError::LockPoisoned)?;
        let next = OffsetRecord {
            offset: None,
            ..current.clone()
        };
        store::write_record(&self.offset_file, &next)?;
        tracing::info!(pipeline = ?next.pipeline, "Offset reset");
        *current = next;
        Ok(())
    }
}
