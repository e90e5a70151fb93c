//! Pipeline execution engine seam.
//!
//! An [`Engine`] turns a [`RunContext`] into a running task. The task talks
//! to its supervisor only through channels: it receives [`RunnerCommand`]s
//! and reports progress through [`RunnerEvents`]. The [`RunnerHandle`] owns
//! the supervisor's side of one launched run.

pub mod local;
pub mod runner;

pub use local::LocalEngine;
pub use runner::RunnerHandle;

use crate::resolve::ValidatedPipeline;
use async_trait::async_trait;
use pr_protocol::Record;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Errors raised while launching or commanding a runner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to launch pipeline '{pipeline}': {reason}")]
    Launch { pipeline: String, reason: String },

    #[error("Runner of pipeline '{0}' is no longer accepting commands")]
    ChannelClosed(String),

    #[error("Command queue of pipeline '{0}' is full")]
    CommandQueueFull(String),

    #[error("Runner task of pipeline '{pipeline}' ended abnormally: {reason}")]
    TaskFailed { pipeline: String, reason: String },
}

/// Commands delivered to a running pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerCommand {
    /// Finish the batch in flight and exit.
    Stop,

    /// Copy the next `batch_size` records flowing through the pipeline.
    ///
    /// `id` identifies the request and is echoed back with the records. A
    /// newer capture replaces one still being filled.
    Capture { id: u64, batch_size: usize },
}

/// Why a runner exited cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A stop command was honoured.
    Stopped,

    /// The source ran out of input.
    Finished,
}

/// Notifications sent by a running pipeline to its supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    Started,
    OffsetCommitted(String),
    CaptureComplete { id: u64, records: Vec<Record> },
    Terminated(Termination),
    Fault(String),
}

/// Sending side of the runner event channel.
///
/// Every method returns `false` once the supervisor has gone away; a runner
/// should stop working at that point.
#[derive(Debug, Clone)]
pub struct RunnerEvents {
    tx: mpsc::Sender<RunnerEvent>,
}

impl RunnerEvents {
    pub fn new(tx: mpsc::Sender<RunnerEvent>) -> Self {
        Self { tx }
    }

    async fn send(&self, event: RunnerEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub async fn started(&self) -> bool {
        self.send(RunnerEvent::Started).await
    }

    pub async fn offset_committed(&self, token: impl Into<String>) -> bool {
        self.send(RunnerEvent::OffsetCommitted(token.into())).await
    }

    pub async fn capture_complete(&self, id: u64, records: Vec<Record>) -> bool {
        self.send(RunnerEvent::CaptureComplete { id, records }).await
    }

    pub async fn terminated(&self, termination: Termination) -> bool {
        self.send(RunnerEvent::Terminated(termination)).await
    }

    pub async fn fault(&self, error: impl Into<String>) -> bool {
        self.send(RunnerEvent::Fault(error.into())).await
    }
}

/// Everything a runner needs to execute one run.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub pipeline: ValidatedPipeline,

    /// Last committed offset of this pipeline revision, `None` to start from
    /// the beginning.
    pub initial_offset: Option<String>,

    pub commands: mpsc::Receiver<RunnerCommand>,
    pub events: RunnerEvents,
}

/// Launches pipeline runs.
///
/// `launch` must return promptly; the run itself executes on the returned
/// task and must report `started` before any other event, then end with
/// exactly one `terminated` or `fault`.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn launch(&self, context: RunContext) -> Result<JoinHandle<()>, EngineError>;
}
