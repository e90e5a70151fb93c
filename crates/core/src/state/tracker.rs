//! Durable pipeline state tracking.
//!
//! The StateTracker owns `runInfo/pipelineState.json`. Every transition is
//! validated against the state machine, written to disk, and only then made
//! visible in memory, so the in-memory state never runs ahead of what was
//! persisted. The one exception is [`StateTracker::abandon_run`], which
//! moves memory to the status a restart would reconcile the record to.

use crate::error::{RunError, RunResult};
use crate::state::machine;
use crate::store;
use chrono::Utc;
use pr_protocol::{PipelineState, PipelineStatus};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

/// File name of the state record inside the run info directory.
pub const STATE_FILE: &str = "pipelineState.json";

/// Owns the durable pipeline state and enforces the lifecycle state machine.
pub struct StateTracker {
    state_file: PathBuf,

    /// Last persisted state. Receivers observe every transition.
    current: watch::Sender<PipelineState>,

    /// Serializes transitions: validate, persist, publish.
    transition_lock: Mutex<()>,
}

impl StateTracker {
    /// Create a tracker for the state record in `run_info_dir`.
    ///
    /// Nothing is read until [`StateTracker::init`] is called; until then the
    /// tracker reports the default NOT_RUNNING state.
    pub fn new(run_info_dir: &Path) -> Self {
        let (current, _) = watch::channel(PipelineState::not_running());
        Self {
            state_file: run_info_dir.join(STATE_FILE),
            current,
            transition_lock: Mutex::new(()),
        }
    }

    /// Path of the durable state record.
    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Load the persisted state and apply restart reconciliation.
    ///
    /// Creates the record with the default NOT_RUNNING state if none exists.
    /// An active persisted state is rewritten to NOT_RUNNING, since no runner
    /// can be alive for it in a freshly initialized controller.
    pub fn init(&self) -> RunResult<PipelineState> {
        let _guard = self.transition_lock.lock().map_err(|_| RunError::LockPoisoned)?;

        let state = match store::read_record::<PipelineState>(&self.state_file)? {
            Some(persisted) => match machine::reconcile_on_restart(persisted.status) {
                Some(status) => {
                    tracing::warn!(
                        pipeline = ?persisted.name,
                        revision = ?persisted.revision,
                        from = %persisted.status,
                        to = %status,
                        "Reconciling state left active by an unclean shutdown"
                    );
                    let reconciled = PipelineState {
                        status,
                        timestamp: Utc::now(),
                        message: Some(format!(
                            "Reconciled from {} after restart",
                            persisted.status
                        )),
                        ..persisted
                    };
                    store::write_record(&self.state_file, &reconciled)?;
                    reconciled
                }
                None => persisted,
            },
            None => {
                let initial = PipelineState::not_running();
                store::write_record(&self.state_file, &initial)?;
                tracing::debug!(path = %self.state_file.display(), "Created pipeline state record");
                initial
            }
        };

        self.current.send_replace(state.clone());
        Ok(state)
    }

    /// Current state. Never waits on an in-flight transition.
    pub fn get_state(&self) -> PipelineState {
        self.current.borrow().clone()
    }

    /// Observe every persisted transition.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.current.subscribe()
    }

    /// Enter STARTING for the given pipeline revision.
    ///
    /// The pipeline identity is bound to the state at this point.
    pub fn begin_run(&self, name: &str, revision: &str) -> RunResult<PipelineState> {
        self.apply(PipelineStatus::Starting, None, Some((name, revision)))
    }

    /// Transition to `status`, recording `message` as the cause.
    ///
    /// # Errors
    ///
    /// - `IllegalStateTransition` if the state machine has no such edge
    /// - `Store` if the new state could not be persisted; the transition is
    ///   not applied in that case
    pub fn transition(
        &self,
        status: PipelineStatus,
        message: Option<String>,
    ) -> RunResult<PipelineState> {
        self.apply(status, message, None)
    }

    /// Settle an active run whose final transition could not be persisted.
    ///
    /// Memory moves to the status [`machine::reconcile_on_restart`] gives
    /// the current one, with `cause` as the message. Writing that state is
    /// attempted once; if it fails the durable record stays active and the
    /// next [`init`](Self::init) reconciles it to the same status. A state
    /// that is not active is returned unchanged.
    pub fn abandon_run(&self, cause: String) -> RunResult<PipelineState> {
        let _guard = self.transition_lock.lock().map_err(|_| RunError::LockPoisoned)?;

        let previous = self.get_state();
        let Some(status) = machine::reconcile_on_restart(previous.status) else {
            return Ok(previous);
        };
        let next = PipelineState {
            status,
            timestamp: Utc::now(),
            message: Some(cause),
            ..previous.clone()
        };

        if let Err(e) = store::write_record(&self.state_file, &next) {
            tracing::error!(
                path = %self.state_file.display(),
                error = %e,
                "State record left active until the next init"
            );
        }
        tracing::warn!(
            pipeline = ?next.name,
            from = %previous.status,
            to = %next.status,
            "Abandoned run settled in memory"
        );
        self.current.send_replace(next.clone());
        Ok(next)
    }

    fn apply(
        &self,
        status: PipelineStatus,
        message: Option<String>,
        identity: Option<(&str, &str)>,
    ) -> RunResult<PipelineState> {
        let _guard = self.transition_lock.lock().map_err(|_| RunError::LockPoisoned)?;

        let previous = self.get_state();
        if !machine::can_transition(previous.status, status) {
            return Err(RunError::IllegalStateTransition {
                from: previous.status,
                to: status,
            });
        }

        let (name, revision) = match identity {
            Some((name, revision)) => (Some(name.to_string()), Some(revision.to_string())),
            None => (previous.name.clone(), previous.revision.clone()),
        };
        let next = PipelineState {
            name,
            revision,
            status,
            timestamp: Utc::now(),
            message,
        };

        store::write_record(&self.state_file, &next)?;

        tracing::info!(
            pipeline = ?next.name,
            revision = ?next.revision,
            from = %previous.status,
            to = %next.status,
            "Pipeline state transition"
        );
        self.current.send_replace(next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_not_running_record() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());

        let state = tracker.init().unwrap();

        assert_eq!(state.status, PipelineStatus::NotRunning);
        assert!(tracker.state_file().exists());
    }

    #[test]
    fn test_full_run_lifecycle() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        tracker.init().unwrap();

        let state = tracker.begin_run("myPipeline", "0").unwrap();
        assert_eq!(state.status, PipelineStatus::Starting);
        assert_eq!(state.name.as_deref(), Some("myPipeline"));

        tracker.transition(PipelineStatus::Running, None).unwrap();
        tracker.transition(PipelineStatus::Stopping, None).unwrap();
        let state = tracker.transition(PipelineStatus::NotRunning, None).unwrap();

        assert_eq!(state.status, PipelineStatus::NotRunning);
        assert_eq!(state.revision.as_deref(), Some("0"));
    }

    #[test]
    fn test_illegal_transition_leaves_state_unchanged() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        let before = tracker.init().unwrap();

        let result = tracker.transition(PipelineStatus::Stopping, None);

        assert!(matches!(
            result,
            Err(RunError::IllegalStateTransition {
                from: PipelineStatus::NotRunning,
                to: PipelineStatus::Stopping,
            })
        ));
        assert_eq!(tracker.get_state(), before);
    }

    #[test]
    fn test_fault_message_is_retained() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        tracker.init().unwrap();
        tracker.begin_run("p", "1").unwrap();
        tracker.transition(PipelineStatus::Running, None).unwrap();

        tracker
            .transition(PipelineStatus::RunError, Some("disk on fire".into()))
            .unwrap();

        let reloaded = StateTracker::new(dir.path());
        let state = reloaded.init().unwrap();
        assert_eq!(state.status, PipelineStatus::RunError);
        assert_eq!(state.message.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn test_init_reconciles_active_state() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        tracker.init().unwrap();
        tracker.begin_run("myPipeline", "0").unwrap();
        tracker.transition(PipelineStatus::Running, None).unwrap();

        // A new tracker over the same directory models a process restart.
        let restarted = StateTracker::new(dir.path());
        let state = restarted.init().unwrap();

        assert_eq!(state.status, PipelineStatus::NotRunning);
        assert_eq!(state.name.as_deref(), Some("myPipeline"));

        let on_disk: PipelineState = store::read_record(restarted.state_file())
            .unwrap()
            .unwrap();
        assert_eq!(on_disk.status, PipelineStatus::NotRunning);
    }

    #[test]
    fn test_init_keeps_terminal_state() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        tracker.init().unwrap();
        tracker.begin_run("p", "0").unwrap();
        tracker.transition(PipelineStatus::Running, None).unwrap();
        tracker.transition(PipelineStatus::Finished, None).unwrap();

        let restarted = StateTracker::new(dir.path());
        assert_eq!(restarted.init().unwrap().status, PipelineStatus::Finished);
    }

    #[test]
    fn test_failed_persist_does_not_apply_transition() {
        let dir = tempdir().unwrap();
        let run_info = dir.path().join("runInfo");
        let tracker = StateTracker::new(&run_info);
        tracker.init().unwrap();

        // Replace the record with a non-empty directory so the rename fails.
        std::fs::remove_file(tracker.state_file()).unwrap();
        std::fs::create_dir_all(tracker.state_file().join("blocker")).unwrap();

        let result = tracker.begin_run("p", "0");

        assert!(matches!(result, Err(RunError::Store(_))));
        assert_eq!(tracker.get_state().status, PipelineStatus::NotRunning);
    }

    #[test]
    fn test_abandoned_run_settles_like_a_restart() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        tracker.init().unwrap();
        tracker.begin_run("p", "0").unwrap();
        tracker.transition(PipelineStatus::Running, None).unwrap();

        std::fs::remove_file(tracker.state_file()).unwrap();
        std::fs::create_dir_all(tracker.state_file().join("blocker")).unwrap();

        let state = tracker.abandon_run("disk full".to_string()).unwrap();
        assert_eq!(state.status, PipelineStatus::NotRunning);
        assert_eq!(state.message.as_deref(), Some("disk full"));
        assert_eq!(tracker.get_state(), state);

        // Once the record is writable again the next run starts normally.
        std::fs::remove_dir_all(tracker.state_file()).unwrap();
        tracker.begin_run("p", "0").unwrap();
    }

    #[test]
    fn test_abandon_keeps_idle_state() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        let before = tracker.init().unwrap();

        assert_eq!(tracker.abandon_run("ignored".to_string()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let dir = tempdir().unwrap();
        let tracker = StateTracker::new(dir.path());
        tracker.init().unwrap();
        let mut rx = tracker.subscribe();

        tracker.begin_run("p", "0").unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, PipelineStatus::Starting);
    }
}
