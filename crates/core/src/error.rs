//! Error taxonomy of the production run controller.
//!
//! Precondition and validation failures are returned synchronously and never
//! change state. Faults raised by a running pipeline are asynchronous and
//! land as a `RUN_ERROR` transition instead; `RunFault` is only returned
//! directly when the runner fails while `start` is still waiting on it.

use crate::engine::EngineError;
use crate::resolve::ValidationError;
use crate::store::StoreError;
use pr_protocol::PipelineStatus;
use thiserror::Error;

/// Errors returned by controller operations.
#[derive(Error, Debug)]
pub enum RunError {
    /// The pipeline configuration is missing or invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The lifecycle state machine has no edge for the requested transition.
    #[error("Illegal state transition from {from} to {to}")]
    IllegalStateTransition {
        from: PipelineStatus,
        to: PipelineStatus,
    },

    /// The operation needs a supervised run and there is none.
    #[error("Pipeline is not running")]
    NotRunning,

    /// A run is already supervised by this controller.
    #[error("A pipeline run is already active")]
    AlreadyRunning,

    /// Only one capture may be in flight per pipeline.
    #[error("A snapshot capture is already in progress for pipeline '{0}'")]
    CaptureAlreadyInProgress(String),

    /// The snapshot slot is occupied; it must be deleted first.
    #[error("A snapshot already exists for pipeline '{0}'; delete it before capturing again")]
    SnapshotExists(String),

    /// No completed snapshot is stored.
    #[error("No snapshot found for pipeline '{0}'")]
    SnapshotNotFound(String),

    /// Capture batch sizes must be positive.
    #[error("Snapshot batch size must be greater than zero")]
    InvalidBatchSize,

    /// The runner reported an unrecoverable error.
    #[error("Pipeline run failed: {0}")]
    RunFault(String),

    /// The runner did not confirm startup in time.
    #[error("Runner did not confirm startup within {0} ms")]
    StartupTimeout(u64),

    /// The execution engine could not be reached or launched.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A durable record could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A thread panicked while holding controller state.
    #[error("Controller state lock poisoned")]
    LockPoisoned,
}

/// Type alias for Result with RunError.
pub type RunResult<T> = Result<T, RunError>;
