//! Persisted lifecycle models.
//!
//! This module defines the records the controller keeps durable across
//! process restarts: the pipeline state and the snapshot status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Lifecycle status of the single pipeline run owned by a controller.
///
/// A normal run progresses through:
/// Starting -> Running -> Stopping -> NotRunning
///
/// Terminal outcomes:
/// - Finished: the source ran out of input
/// - RunError: the run failed, the cause is kept in the state message
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    /// Pipeline is defined but has never been run.
    Edited,

    /// A run was requested and the runner is initializing.
    Starting,

    /// The runner confirmed startup and is moving batches.
    Running,

    /// A stop was requested; the runner is draining.
    Stopping,

    /// Cleanly stopped, or never started.
    NotRunning,

    /// The source reported that it has no more input.
    Finished,

    /// The run failed with an unrecoverable error.
    RunError,
}

impl PipelineStatus {
    /// Whether a run is in flight in this status.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }

    /// Wire name of the status, as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edited => "EDITED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::NotRunning => "NOT_RUNNING",
            Self::Finished => "FINISHED",
            Self::RunError => "RUN_ERROR",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable state of the pipeline run owned by a controller.
///
/// Identified by pipeline name and revision. Both are `None` until the
/// first run is started.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct PipelineState {
    /// Name of the pipeline this state belongs to.
    pub name: Option<String>,

    /// Revision of the pipeline definition being run.
    pub revision: Option<String>,

    /// Current lifecycle status.
    pub status: PipelineStatus,

    /// Time of the last transition.
    pub timestamp: DateTime<Utc>,

    /// Human-readable cause of the last transition, e.g. a fault message.
    pub message: Option<String>,
}

impl PipelineState {
    /// State of a controller that has never run anything.
    pub fn not_running() -> Self {
        Self {
            name: None,
            revision: None,
            status: PipelineStatus::NotRunning,
            timestamp: Utc::now(),
            message: None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::not_running()
    }
}

/// Status of the single snapshot slot of a pipeline.
///
/// `exists` and `in_progress` are never both true: a capture in flight has
/// not produced a snapshot yet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatus {
    /// A completed capture is stored and can be fetched.
    pub exists: bool,

    /// A capture was accepted and has not completed yet.
    pub in_progress: bool,
}
