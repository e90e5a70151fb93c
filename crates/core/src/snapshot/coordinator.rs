//! Snapshot capture coordination.
//!
//! The SnapshotCoordinator is the only writer of snapshot status. A capture
//! request marks the pipeline's slot in progress under a fresh capture id;
//! the runner later delivers the intercepted records tagged with that id,
//! which the coordinator persists before clearing the flag. Deliveries for
//! any other id belong to a capture that was deleted or replaced and are
//! dropped. Clients learn about completion only by polling
//! [`SnapshotCoordinator::get_status`] (or by listening to controller events).

use crate::error::{RunError, RunResult};
use crate::snapshot::store::SnapshotStore;
use chrono::Utc;
use pr_protocol::{PipelineStatus, Record, Snapshot, SnapshotStatus};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Mutex, MutexGuard};

/// A capture accepted for a pipeline and not yet delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AcceptedCapture {
    id: u64,
    batch_size: usize,
}

#[derive(Debug, Default)]
struct Flags {
    next_id: u64,
    in_progress: HashMap<String, AcceptedCapture>,
}

/// Owns the snapshot store and the in-memory in-progress flags.
pub struct SnapshotCoordinator {
    store: SnapshotStore,

    /// Accepted captures per pipeline.
    ///
    /// Held while persisting a completed capture so status reads never see a
    /// half-applied completion.
    flags: Mutex<Flags>,
}

impl SnapshotCoordinator {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            flags: Mutex::new(Flags::default()),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn flags(&self) -> RunResult<MutexGuard<'_, Flags>> {
        self.flags.lock().map_err(|_| RunError::LockPoisoned)
    }

    /// Forget every in-flight capture. Persisted snapshots are kept.
    ///
    /// Ids keep increasing, so a delivery for a capture accepted before this
    /// call can never match one accepted after it.
    pub fn init(&self) -> RunResult<()> {
        self.flags()?.in_progress.clear();
        Ok(())
    }

    /// Accept a capture of the next `batch_size` records of `pipeline`.
    ///
    /// Returns the id the runner must echo back with the records.
    ///
    /// # Errors
    ///
    /// - `NotRunning` unless `status` is RUNNING
    /// - `InvalidBatchSize` if `batch_size` is zero
    /// - `CaptureAlreadyInProgress` if a capture is in flight
    /// - `SnapshotExists` if a completed snapshot occupies the slot
    pub fn request_capture(
        &self,
        pipeline: &str,
        status: PipelineStatus,
        batch_size: usize,
    ) -> RunResult<u64> {
        if status != PipelineStatus::Running {
            return Err(RunError::NotRunning);
        }
        if batch_size == 0 {
            return Err(RunError::InvalidBatchSize);
        }

        let mut flags = self.flags()?;
        if flags.in_progress.contains_key(pipeline) {
            return Err(RunError::CaptureAlreadyInProgress(pipeline.to_string()));
        }
        if self.store.exists(pipeline) {
            return Err(RunError::SnapshotExists(pipeline.to_string()));
        }

        flags.next_id += 1;
        let id = flags.next_id;
        flags
            .in_progress
            .insert(pipeline.to_string(), AcceptedCapture { id, batch_size });
        tracing::info!(pipeline = pipeline, capture_id = id, batch_size = batch_size, "Snapshot capture requested");
        Ok(id)
    }

    /// Persist records delivered by the runner for capture `id`.
    ///
    /// Returns `false` when `id` is not the capture in flight for `pipeline`
    /// (it was deleted, abandoned or replaced meanwhile); the records are
    /// dropped in that case. A failed write clears the flag.
    pub fn complete_capture(&self, pipeline: &str, id: u64, records: Vec<Record>) -> RunResult<bool> {
        let mut flags = self.flags()?;
        let accepted = match flags.in_progress.get(pipeline) {
            Some(accepted) if accepted.id == id => *accepted,
            other => {
                tracing::debug!(
                    pipeline = pipeline,
                    capture_id = id,
                    expected = ?other.map(|a| a.id),
                    "Dropping capture that is no longer requested"
                );
                return Ok(false);
            }
        };

        let count = records.len();
        let snapshot = Snapshot {
            pipeline: pipeline.to_string(),
            captured_at: Utc::now(),
            records,
        };
        let saved = self.store.save(&snapshot);
        flags.in_progress.remove(pipeline);
        saved?;

        tracing::info!(
            pipeline = pipeline,
            capture_id = id,
            requested = accepted.batch_size,
            captured = count,
            "Snapshot captured"
        );
        Ok(true)
    }

    /// Drop the in-progress flag of `pipeline` without storing anything.
    pub fn abandon_capture(&self, pipeline: &str) -> RunResult<()> {
        if self.flags()?.in_progress.remove(pipeline).is_some() {
            tracing::warn!(pipeline = pipeline, "Snapshot capture abandoned");
        }
        Ok(())
    }

    /// Current status of the slot of `pipeline`. Safe to poll.
    pub fn get_status(&self, pipeline: &str) -> RunResult<SnapshotStatus> {
        let flags = self.flags()?;
        let in_progress = flags.in_progress.contains_key(pipeline);
        Ok(SnapshotStatus {
            exists: !in_progress && self.store.exists(pipeline),
            in_progress,
        })
    }

    /// Raw bytes of the completed snapshot of `pipeline`.
    ///
    /// Decode with [`crate::snapshot::decode_snapshot`].
    pub fn get_snapshot(&self, pipeline: &str) -> RunResult<Box<dyn Read + Send>> {
        let flags = self.flags()?;
        if flags.in_progress.contains_key(pipeline) {
            return Err(RunError::SnapshotNotFound(pipeline.to_string()));
        }
        match self.store.open(pipeline)? {
            Some(file) => Ok(Box::new(file)),
            None => Err(RunError::SnapshotNotFound(pipeline.to_string())),
        }
    }

    /// Remove the snapshot of `pipeline` and reset its status to empty.
    ///
    /// Deleting an empty slot is a no-op.
    pub fn delete_snapshot(&self, pipeline: &str) -> RunResult<()> {
        let mut flags = self.flags()?;
        let cancelled = flags.in_progress.remove(pipeline).is_some();
        let removed = self.store.delete(pipeline)?;
        if cancelled || removed {
            tracing::info!(pipeline = pipeline, cancelled = cancelled, "Snapshot deleted");
        }
        Ok(())
    }
}
