//! Polling assertion helpers.
//!
//! The controller reports asynchronous outcomes only through pollable state
//! and its notification channel, so tests wait with a deadline instead of
//! sleeping for a fixed time.

use pr_core::ProductionRunController;
use pr_protocol::{Event, PipelineState, PipelineStatus, SnapshotStatus};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(10);

/// Poll until `check` returns `Some`, panicking after `timeout`.
pub async fn poll_until<T, F>(timeout: Duration, what: &str, mut check: F) -> T
where
    F: FnMut() -> Option<T>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return value;
        }
        if Instant::now() >= deadline {
            panic!("Timed out after {timeout:?} waiting for {what}");
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Wait until the pipeline reaches `status`.
pub async fn wait_for_status(
    controller: &ProductionRunController,
    status: PipelineStatus,
) -> PipelineState {
    poll_until(WAIT, &format!("status {status}"), || {
        let state = controller.get_pipeline_state();
        (state.status == status).then_some(state)
    })
    .await
}

/// Wait until a completed snapshot exists.
pub async fn wait_for_snapshot(controller: &ProductionRunController) -> SnapshotStatus {
    poll_until(WAIT, "snapshot to exist", || {
        controller
            .get_snapshot_status()
            .ok()
            .filter(|status| status.exists)
    })
    .await
}

/// Wait until at least one offset has been committed.
pub async fn wait_for_offset(controller: &ProductionRunController) -> String {
    poll_until(WAIT, "an offset commit", || {
        controller.get_offset().ok().flatten()
    })
    .await
}

/// Receive events until one matches `predicate`.
pub async fn next_event<F>(events: &mut broadcast::Receiver<Event>, mut predicate: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    let found = tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    found.expect("Timed out waiting for event")
}

/// Assert that `state` is RUN_ERROR with a message containing `needle`.
pub fn assert_run_error(state: &PipelineState, needle: &str) {
    assert_eq!(state.status, PipelineStatus::RunError);
    let message = state.message.as_deref().unwrap_or_default();
    assert!(
        message.contains(needle),
        "Expected RUN_ERROR message containing '{needle}', got '{message}'"
    );
}
