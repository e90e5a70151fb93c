//! Lifecycle state machine.
//!
//! Edges (source -> target):
//!
//! - EDITED | NOT_RUNNING | FINISHED | RUN_ERROR -> STARTING: start requested
//! - STARTING -> RUNNING: runner confirmed startup
//! - STARTING -> RUN_ERROR: runner failed to initialize
//! - RUNNING -> STOPPING: stop requested
//! - RUNNING -> FINISHED: source exhausted
//! - RUNNING -> RUN_ERROR: runner fault
//! - STOPPING -> NOT_RUNNING: runner drained and exited
//! - STOPPING -> RUN_ERROR: runner fault while draining
//!
//! Restart reconciliation is not an edge: it is applied only by
//! [`reconcile_on_restart`] when a controller initializes.

use pr_protocol::PipelineStatus;

/// Whether the state machine has an edge from `from` to `to`.
pub fn can_transition(from: PipelineStatus, to: PipelineStatus) -> bool {
    use pr_protocol::PipelineStatus::*;

    matches!(
        (from, to),
        (Edited | NotRunning | Finished | RunError, Starting)
            | (Starting, Running | RunError)
            | (Running, Stopping | Finished | RunError)
            | (Stopping, NotRunning | RunError)
    )
}

/// Status a persisted state must be rewritten to when a controller starts.
///
/// An active status with no live runner can only be left behind by an
/// unclean shutdown, so it reconciles to NOT_RUNNING. Returns `None` when the
/// persisted status stands as is.
pub fn reconcile_on_restart(persisted: PipelineStatus) -> Option<PipelineStatus> {
    if persisted.is_active() {
        Some(PipelineStatus::NotRunning)
    } else {
        None
    }
}

/// Whether offset commits from the runner are accepted in this status.
pub fn accepts_offset_commits(status: PipelineStatus) -> bool {
    matches!(status, PipelineStatus::Starting | PipelineStatus::Running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pr_protocol::PipelineStatus::*;

    const ALL: [PipelineStatus; 7] = [
        Edited, Starting, Running, Stopping, NotRunning, Finished, RunError,
    ];

    #[test]
    fn test_start_allowed_only_from_idle_states() {
        for from in ALL {
            let expected = matches!(from, Edited | NotRunning | Finished | RunError);
            assert_eq!(can_transition(from, Starting), expected, "from {from}");
        }
    }

    #[test]
    fn test_running_edges() {
        assert!(can_transition(Starting, Running));
        assert!(can_transition(Running, Stopping));
        assert!(can_transition(Running, Finished));
        assert!(can_transition(Running, RunError));
        assert!(!can_transition(Running, NotRunning));
        assert!(!can_transition(Running, Running));
    }

    #[test]
    fn test_stopping_edges() {
        assert!(can_transition(Stopping, NotRunning));
        assert!(can_transition(Stopping, RunError));
        assert!(!can_transition(Stopping, Stopping));
        assert!(!can_transition(Stopping, Running));
    }

    #[test]
    fn test_no_edge_into_edited() {
        for from in ALL {
            assert!(!can_transition(from, Edited));
        }
    }

    #[test]
    fn test_idle_states_cannot_stop() {
        for from in [Edited, NotRunning, Finished, RunError] {
            assert!(!can_transition(from, Stopping));
        }
    }

    #[test]
    fn test_reconcile_active_states() {
        assert_eq!(reconcile_on_restart(Starting), Some(NotRunning));
        assert_eq!(reconcile_on_restart(Running), Some(NotRunning));
        assert_eq!(reconcile_on_restart(Stopping), Some(NotRunning));
        assert_eq!(reconcile_on_restart(Finished), None);
        assert_eq!(reconcile_on_restart(RunError), None);
        assert_eq!(reconcile_on_restart(NotRunning), None);
    }

    #[test]
    fn test_offset_commit_window() {
        assert!(accepts_offset_commits(Starting));
        assert!(accepts_offset_commits(Running));
        assert!(!accepts_offset_commits(Stopping));
        assert!(!accepts_offset_commits(NotRunning));
    }
}
