//! The production run controller.
//!
//! [`ProductionRunController`] is the single owner of "is a run currently
//! active". It composes the state tracker, the offset tracker and the
//! snapshot coordinator, launches runs through an [`Engine`], and supervises
//! each run on a background task that turns runner events into state
//! transitions, offset commits and snapshot completions.
//!
//! All lifecycle operations serialize on the run slot, so concurrent
//! `start_pipeline`, `stop_pipeline` and `capture_snapshot` calls observe a
//! consistent order of states.

use crate::config::models::{AppConfig, RUN_INFO_DIR, SNAPSHOTS_DIR};
use crate::engine::{Engine, LocalEngine, RunnerEvent, RunnerHandle, Termination};
use crate::error::{RunError, RunResult};
use crate::offset::{OffsetRecord, OffsetTracker};
use crate::resolve::{PipelineResolver, PipelineStore, StoreResolver};
use crate::snapshot::{SnapshotCoordinator, SnapshotStore};
use crate::stages::StageLibrary;
use crate::state::{machine, StateTracker};
use pr_protocol::{ControllerSettings, Event, PipelineState, PipelineStatus, Record, SnapshotStatus};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Attempts at persisting the final state of a run.
const END_OF_RUN_ATTEMPTS: u32 = 3;
const END_OF_RUN_RETRY_DELAY: Duration = Duration::from_millis(20);

/// A run currently supervised by the controller.
struct ActiveRun {
    handle: RunnerHandle,
    supervisor: JoinHandle<()>,
}

struct ControllerInner {
    settings: ControllerSettings,
    resolver: Arc<dyn PipelineResolver>,
    engine: Arc<dyn Engine>,
    tracker: StateTracker,
    offsets: OffsetTracker,
    snapshots: SnapshotCoordinator,
    run: Mutex<Option<ActiveRun>>,
    events: broadcast::Sender<Event>,
}

/// Starts, stops, monitors and recovers a single pipeline run.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct ProductionRunController {
    inner: Arc<ControllerInner>,
}

impl ProductionRunController {
    /// Create a controller keeping its durable records under `data_dir`.
    ///
    /// Nothing is read from disk until [`init`](Self::init) is called.
    pub fn new(
        settings: ControllerSettings,
        data_dir: &Path,
        resolver: Arc<dyn PipelineResolver>,
        engine: Arc<dyn Engine>,
    ) -> Self {
        let run_info_dir = data_dir.join(RUN_INFO_DIR);
        let (events, _) = broadcast::channel(settings.event_channel_capacity.max(1));

        Self {
            inner: Arc::new(ControllerInner {
                tracker: StateTracker::new(&run_info_dir),
                offsets: OffsetTracker::new(&run_info_dir),
                snapshots: SnapshotCoordinator::new(SnapshotStore::new(&data_dir.join(SNAPSHOTS_DIR))),
                settings,
                resolver,
                engine,
                run: Mutex::new(None),
                events,
            }),
        }
    }

    /// Controller over a loaded project: pipelines are resolved from its
    /// pipelines directory and run on a [`LocalEngine`].
    pub fn from_config(config: &AppConfig, library: Arc<StageLibrary>) -> Self {
        let resolver = StoreResolver::new(
            PipelineStore::new(config.pipelines_dir()),
            Arc::clone(&library),
        );
        Self::new(
            config.settings.clone(),
            &config.data_dir(),
            Arc::new(resolver),
            Arc::new(LocalEngine::new(library)),
        )
    }

    /// Load persisted records and reconcile an unclean shutdown.
    ///
    /// An active persisted state becomes NOT_RUNNING. No run is started.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if this controller supervises a run
    /// - `Store` if a record cannot be read or rewritten
    pub async fn init(&self) -> RunResult<PipelineState> {
        let slot = self.inner.run.lock().await;
        if slot.is_some() {
            return Err(RunError::AlreadyRunning);
        }

        let state = self.inner.tracker.init()?;
        let offset = self.inner.offsets.init()?;
        self.inner.snapshots.init()?;

        tracing::info!(
            pipeline = ?state.name,
            revision = ?state.revision,
            status = %state.status,
            offset = ?offset.offset,
            "Controller initialized"
        );
        self.inner.emit_state(&state);
        Ok(state)
    }

    /// Halt the supervised run, if any, without draining it.
    ///
    /// The persisted state is left as it is and gets reconciled by the next
    /// [`init`](Self::init).
    pub async fn stop(&self) {
        let mut slot = self.inner.run.lock().await;
        let Some(active) = slot.take() else {
            return;
        };

        active.supervisor.abort();
        let pipeline = active.handle.pipeline().to_string();
        active.handle.kill();
        if let Err(e) = self.inner.snapshots.abandon_capture(&pipeline) {
            tracing::error!(pipeline = %pipeline, error = %e, "Failed to clear snapshot capture");
        }
        tracing::info!(pipeline = %pipeline, "Controller stopped, persisted state left for recovery");
    }

    /// Validate and start `name`@`revision`.
    ///
    /// Returns once the runner has confirmed startup, with the RUNNING state.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a run is supervised; nothing changes
    /// - `Validation` if the pipeline cannot be resolved; nothing changes
    /// - `RunFault`, `Engine` or `StartupTimeout` if the runner fails to come
    ///   up; the state is RUN_ERROR afterwards
    pub async fn start_pipeline(&self, name: &str, revision: &str) -> RunResult<PipelineState> {
        let inner = &self.inner;
        let mut slot = inner.run.lock().await;
        if slot.is_some() {
            return Err(RunError::AlreadyRunning);
        }

        let pipeline = inner.resolver.resolve(name, revision).map_err(|e| {
            tracing::warn!(pipeline = name, revision = revision, error = %e, "Pipeline failed validation");
            e
        })?;

        let state = inner.tracker.begin_run(name, revision)?;
        inner.emit_state(&state);

        let initial_offset = match inner.offsets.resume_from(name, revision) {
            Ok(offset) => offset,
            Err(e) => return Err(inner.fail_start(None, e)),
        };

        let (handle, mut events) = match RunnerHandle::launch(
            inner.engine.as_ref(),
            pipeline,
            initial_offset.clone(),
            inner.settings.event_channel_capacity,
        )
        .await
        {
            Ok(launched) => launched,
            Err(e) => return Err(inner.fail_start(None, e.into())),
        };
        let run_id = handle.run_id();

        let startup = Duration::from_millis(inner.settings.startup_timeout_ms);
        let failure = match tokio::time::timeout(startup, events.recv()).await {
            Ok(Some(RunnerEvent::Started)) => None,
            Ok(Some(RunnerEvent::Fault(error))) => Some(RunError::RunFault(error)),
            Ok(Some(other)) => Some(RunError::RunFault(format!(
                "runner reported {other:?} before confirming startup"
            ))),
            Ok(None) => Some(RunError::RunFault(
                "runner exited before confirming startup".to_string(),
            )),
            Err(_) => Some(RunError::StartupTimeout(inner.settings.startup_timeout_ms)),
        };
        if let Some(error) = failure {
            handle.kill();
            return Err(inner.fail_start(Some(run_id), error));
        }

        let state = match inner.transition(PipelineStatus::Running, None) {
            Ok(state) => state,
            Err(e) => {
                handle.kill();
                return Err(inner.fail_start(Some(run_id), e));
            }
        };

        tracing::info!(
            run_id = %run_id,
            pipeline = name,
            revision = revision,
            offset = ?initial_offset,
            "Pipeline running"
        );

        let supervisor = tokio::spawn(supervise(
            Arc::clone(inner),
            run_id,
            name.to_string(),
            events,
        ));
        *slot = Some(ActiveRun { handle, supervisor });
        Ok(state)
    }

    /// Ask the supervised run to stop.
    ///
    /// Returns the STOPPING state immediately; NOT_RUNNING follows once the
    /// runner has drained and exited. See [`await_termination`](Self::await_termination).
    ///
    /// # Errors
    ///
    /// - `NotRunning` if no run is supervised
    /// - `IllegalStateTransition` if the run is already stopping
    pub async fn stop_pipeline(&self) -> RunResult<PipelineState> {
        let slot = self.inner.run.lock().await;
        let Some(active) = slot.as_ref() else {
            return Err(RunError::NotRunning);
        };

        let state = self.inner.transition(PipelineStatus::Stopping, None)?;
        if let Err(e) = active.handle.request_stop() {
            // The runner is already gone; its supervisor settles the state.
            tracing::warn!(run_id = %active.handle.run_id(), error = %e, "Stop request not delivered");
        }
        Ok(state)
    }

    /// Current pipeline state. Never blocks.
    pub fn get_pipeline_state(&self) -> PipelineState {
        self.inner.tracker.get_state()
    }

    /// Wait until no run is active, for at most `timeout`.
    ///
    /// Returns the settled state, or `None` on timeout.
    pub async fn await_termination(&self, timeout: Duration) -> Option<PipelineState> {
        let mut states = self.inner.tracker.subscribe();
        let settled = match tokio::time::timeout(
            timeout,
            states.wait_for(|state| !state.status.is_active()),
        )
        .await
        {
            Ok(Ok(state)) => Some(state.clone()),
            _ => None,
        };
        settled
    }

    /// Capture the next `batch_size` records of the running pipeline.
    ///
    /// Returns as soon as the request is accepted; poll
    /// [`get_snapshot_status`](Self::get_snapshot_status) for completion.
    ///
    /// # Errors
    ///
    /// - `NotRunning` unless a run is supervised and RUNNING
    /// - `InvalidBatchSize`, `CaptureAlreadyInProgress` or `SnapshotExists`
    pub async fn capture_snapshot(&self, batch_size: usize) -> RunResult<()> {
        let slot = self.inner.run.lock().await;
        let Some(active) = slot.as_ref() else {
            return Err(RunError::NotRunning);
        };

        let pipeline = active.handle.pipeline();
        let status = self.inner.tracker.get_state().status;
        let id = self
            .inner
            .snapshots
            .request_capture(pipeline, status, batch_size)?;

        if let Err(e) = active.handle.request_capture(id, batch_size) {
            self.inner.snapshots.abandon_capture(pipeline)?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Snapshot status of the current pipeline.
    pub fn get_snapshot_status(&self) -> RunResult<SnapshotStatus> {
        match self.current_pipeline() {
            Some(pipeline) => self.inner.snapshots.get_status(&pipeline),
            None => Ok(SnapshotStatus::default()),
        }
    }

    /// Raw persisted snapshot of the current pipeline.
    ///
    /// # Errors
    ///
    /// `SnapshotNotFound` unless a completed snapshot exists.
    pub fn get_snapshot(&self) -> RunResult<Box<dyn Read + Send>> {
        match self.current_pipeline() {
            Some(pipeline) => self.inner.snapshots.get_snapshot(&pipeline),
            None => Err(RunError::SnapshotNotFound(String::new())),
        }
    }

    /// Delete the snapshot of the current pipeline. Idempotent.
    pub fn delete_snapshot(&self) -> RunResult<()> {
        match self.current_pipeline() {
            Some(pipeline) => self.inner.snapshots.delete_snapshot(&pipeline),
            None => Ok(()),
        }
    }

    /// Last committed offset token, `None` if no progress was committed.
    pub fn get_offset(&self) -> RunResult<Option<String>> {
        self.inner.offsets.get_offset()
    }

    /// Offset record including the pipeline revision it belongs to.
    pub fn get_offset_record(&self) -> RunResult<OffsetRecord> {
        self.inner.offsets.get_record()
    }

    /// Forget the committed offset so the next run starts from the beginning.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while a run is supervised.
    pub async fn reset_offset(&self) -> RunResult<()> {
        let slot = self.inner.run.lock().await;
        if slot.is_some() {
            return Err(RunError::AlreadyRunning);
        }
        self.inner.offsets.reset_offset()
    }

    /// Receive controller notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Whether a run is currently supervised.
    pub async fn is_active(&self) -> bool {
        self.inner.run.lock().await.is_some()
    }

    fn current_pipeline(&self) -> Option<String> {
        self.inner.tracker.get_state().name
    }
}

impl ControllerInner {
    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_state(&self, state: &PipelineState) {
        self.emit(Event::StateChanged {
            state: state.clone(),
        });
    }

    fn transition(
        &self,
        status: PipelineStatus,
        message: Option<String>,
    ) -> RunResult<PipelineState> {
        let state = self.tracker.transition(status, message)?;
        self.emit_state(&state);
        Ok(state)
    }

    /// Record a failed startup as RUN_ERROR and hand back `error`.
    fn fail_start(&self, run_id: Option<Uuid>, error: RunError) -> RunError {
        let message = error.to_string();
        tracing::error!(run_id = ?run_id, error = %message, "Pipeline failed to start");

        let state = self.tracker.get_state();
        if let Err(e) = self.transition(PipelineStatus::RunError, Some(message.clone())) {
            tracing::error!(error = %e, "Failed to record startup failure");
        }
        if let (Some(run_id), Some(pipeline)) = (run_id, state.name) {
            self.emit(Event::RunFault {
                run_id,
                pipeline,
                error: message,
            });
        }
        error
    }

    fn commit_offset(&self, run_id: Uuid, pipeline: &str, token: String) {
        let status = self.tracker.get_state().status;
        if !machine::accepts_offset_commits(status) {
            tracing::warn!(
                run_id = %run_id,
                status = %status,
                offset = %token,
                "Dropping offset commit outside an active run"
            );
            return;
        }

        match self.offsets.commit_offset(&token) {
            Ok(()) => self.emit(Event::OffsetCommitted {
                run_id,
                pipeline: pipeline.to_string(),
                offset: token,
            }),
            Err(e) => {
                tracing::error!(run_id = %run_id, offset = %token, error = %e, "Failed to commit offset")
            }
        }
    }

    fn complete_capture(&self, run_id: Uuid, pipeline: &str, id: u64, records: Vec<Record>) {
        let count = records.len();
        match self.snapshots.complete_capture(pipeline, id, records) {
            Ok(true) => self.emit(Event::SnapshotCaptured {
                run_id,
                pipeline: pipeline.to_string(),
                records: count,
            }),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(run_id = %run_id, pipeline = pipeline, capture_id = id, error = %e, "Failed to store snapshot")
            }
        }
    }

    /// Record the final status of a run.
    ///
    /// A failed write is retried. If the state still cannot be persisted, the
    /// run is settled in memory the way a restart would reconcile it, so the
    /// controller stays usable once the slot is released.
    async fn record_end(&self, run_id: Uuid, status: PipelineStatus, message: Option<String>) {
        let mut attempt = 1;
        let error = loop {
            match self.transition(status, message.clone()) {
                Ok(state) => {
                    tracing::info!(run_id = %run_id, pipeline = ?state.name, status = %state.status, "Pipeline run ended");
                    return;
                }
                Err(e @ RunError::Store(_)) if attempt < END_OF_RUN_ATTEMPTS => {
                    tracing::warn!(run_id = %run_id, attempt = attempt, error = %e, "Retrying end of run record");
                    tokio::time::sleep(END_OF_RUN_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(e) => break e,
            }
        };

        tracing::error!(run_id = %run_id, status = %status, error = %error, "Failed to record end of run");
        match self.tracker.abandon_run(format!(
            "Run ended as {status} but the state could not be persisted: {error}"
        )) {
            Ok(state) => self.emit_state(&state),
            Err(e) => tracing::error!(run_id = %run_id, error = %e, "Failed to settle abandoned run"),
        }
    }

    /// Settle the state of a run that has ended and release its slot.
    async fn finish_run(&self, run_id: Uuid, pipeline: &str, outcome: Result<Termination, String>) {
        let mut slot = self.run.lock().await;
        if slot.as_ref().map(|active| active.handle.run_id()) != Some(run_id) {
            tracing::debug!(run_id = %run_id, "Run no longer supervised, ignoring its end");
            return;
        }

        let current = self.tracker.get_state().status;
        let (status, message) = match &outcome {
            Ok(_) if current == PipelineStatus::Stopping => (PipelineStatus::NotRunning, None),
            Ok(_) => (PipelineStatus::Finished, None),
            Err(error) => (PipelineStatus::RunError, Some(error.clone())),
        };
        self.record_end(run_id, status, message).await;
        if let Err(error) = outcome {
            self.emit(Event::RunFault {
                run_id,
                pipeline: pipeline.to_string(),
                error,
            });
        }

        if let Err(e) = self.snapshots.abandon_capture(pipeline) {
            tracing::error!(pipeline = pipeline, error = %e, "Failed to clear snapshot capture");
        }
        let active = slot.take();
        drop(slot);

        if let Some(active) = active {
            if let Err(e) = active.handle.wait().await {
                tracing::warn!(run_id = %run_id, error = %e, "Runner task did not exit cleanly");
            }
        }
    }
}

/// Route the events of one run until it ends.
async fn supervise(
    inner: Arc<ControllerInner>,
    run_id: Uuid,
    pipeline: String,
    mut events: mpsc::Receiver<RunnerEvent>,
) {
    let outcome = loop {
        match events.recv().await {
            Some(RunnerEvent::OffsetCommitted(token)) => inner.commit_offset(run_id, &pipeline, token),
            Some(RunnerEvent::CaptureComplete { id, records }) => {
                inner.complete_capture(run_id, &pipeline, id, records)
            }
            Some(RunnerEvent::Started) => {
                tracing::warn!(run_id = %run_id, "Ignoring repeated startup confirmation")
            }
            Some(RunnerEvent::Terminated(termination)) => break Ok(termination),
            Some(RunnerEvent::Fault(error)) => break Err(error),
            None => break Err("runner exited without reporting termination".to_string()),
        }
    };
    inner.finish_run(run_id, &pipeline, outcome).await;
}
