//! Supervisor-side handle of one launched run.

use crate::engine::{Engine, EngineError, RunContext, RunnerCommand, RunnerEvent, RunnerEvents};
use crate::resolve::ValidatedPipeline;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Owns the command channel and the task of a running pipeline.
///
/// Commands are queued without waiting; the runner applies them at its next
/// batch boundary.
#[derive(Debug)]
pub struct RunnerHandle {
    run_id: Uuid,
    pipeline: String,
    commands: mpsc::Sender<RunnerCommand>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    /// Launch `pipeline` on `engine`, resuming after `initial_offset`.
    ///
    /// Returns the handle and the receiving side of the run's event channel.
    pub async fn launch(
        engine: &dyn Engine,
        pipeline: ValidatedPipeline,
        initial_offset: Option<String>,
        channel_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<RunnerEvent>), EngineError> {
        let run_id = Uuid::new_v4();
        let capacity = channel_capacity.max(1);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let name = pipeline.name().to_string();

        let task = engine
            .launch(RunContext {
                run_id,
                pipeline,
                initial_offset,
                commands: command_rx,
                events: RunnerEvents::new(event_tx),
            })
            .await?;

        tracing::debug!(run_id = %run_id, pipeline = %name, "Runner launched");

        Ok((
            Self {
                run_id,
                pipeline: name,
                commands: command_tx,
                task,
            },
            event_rx,
        ))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Ask the runner to drain and exit.
    pub fn request_stop(&self) -> Result<(), EngineError> {
        self.send(RunnerCommand::Stop)
    }

    /// Ask the runner to copy the next `batch_size` records as capture `id`.
    pub fn request_capture(&self, id: u64, batch_size: usize) -> Result<(), EngineError> {
        self.send(RunnerCommand::Capture { id, batch_size })
    }

    fn send(&self, command: RunnerCommand) -> Result<(), EngineError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::CommandQueueFull(self.pipeline.clone()),
            TrySendError::Closed(_) => EngineError::ChannelClosed(self.pipeline.clone()),
        })
    }

    /// Abort the runner task without draining.
    pub fn kill(self) {
        self.task.abort();
        tracing::warn!(run_id = %self.run_id, pipeline = %self.pipeline, "Runner killed");
    }

    /// Wait for the runner task to exit.
    pub async fn wait(self) -> Result<(), EngineError> {
        match self.task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(EngineError::TaskFailed {
                pipeline: self.pipeline,
                reason: e.to_string(),
            }),
        }
    }
}
