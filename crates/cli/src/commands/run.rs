use colored::Colorize;
use color_eyre::eyre::bail;
use color_eyre::Result;
use pr_core::config::models::AppConfig;
use pr_core::snapshot::decode_snapshot;
use pr_core::ProductionRunController;
use pr_protocol::{Event, PipelineStatus};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::{paint, stage_library};

/// Execute the `run` command.
///
/// Starts the pipeline, optionally captures a snapshot, and follows the run
/// until it settles. Ctrl-C or `--for-ms` request a clean stop. A rejected
/// snapshot request is reported without ending the run.
pub async fn execute(
    config: &AppConfig,
    name: &str,
    revision: &str,
    snapshot: Option<usize>,
    for_ms: Option<u64>,
) -> Result<()> {
    let controller = ProductionRunController::from_config(config, stage_library());
    let recovered = controller.init().await?;
    if recovered.status != PipelineStatus::NotRunning {
        println!("Last state: {}", paint(recovered.status));
    }

    let mut events = controller.subscribe();
    let state = controller.start_pipeline(name, revision).await?;
    println!("{}@{} {}", name, revision, paint(state.status));

    // The run is live from here on: report failures and keep following it
    // until it settles, so its state record is never left active.
    if let Some(batch_size) = snapshot {
        match controller.capture_snapshot(batch_size).await {
            Ok(()) => println!("Snapshot of {batch_size} records requested"),
            Err(e) => eprintln!("{} {e}", "Snapshot not captured:".yellow().bold()),
        }
    }

    let deadline = for_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    let mut stop_requested = false;

    let settled = loop {
        let current = controller.get_pipeline_state();
        if !current.status.is_active() {
            break current;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !stop_requested => {
                stop_requested = true;
                request_stop(&controller, "interrupted").await;
            }
            _ = wait_until(deadline), if !stop_requested => {
                stop_requested = true;
                request_stop(&controller, "time limit reached").await;
            }
            event = events.recv() => match event {
                Ok(event) => report(&controller, event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped = skipped, "Event listener lagged");
                }
                Err(RecvError::Closed) => break controller.get_pipeline_state(),
            },
        }
    };

    let offset = controller.get_offset()?;
    println!(
        "{}@{} {} (offset {})",
        name,
        revision,
        paint(settled.status),
        offset.as_deref().unwrap_or("-")
    );

    if settled.status == PipelineStatus::RunError {
        bail!(
            "Run failed: {}",
            settled.message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn request_stop(controller: &ProductionRunController, reason: &str) {
    println!("Stopping ({reason})");
    if let Err(e) = controller.stop_pipeline().await {
        tracing::warn!(error = %e, "Stop request rejected");
    }
}

fn report(controller: &ProductionRunController, event: Event) {
    match event {
        Event::StateChanged { state } => {
            tracing::debug!(status = %state.status, "State changed");
        }
        Event::OffsetCommitted { offset, .. } => {
            tracing::debug!(offset = %offset, "Offset committed");
        }
        Event::SnapshotCaptured { records, .. } => {
            println!("{} {records} records", "Snapshot captured:".cyan().bold());
            match controller.get_snapshot().map(decode_snapshot) {
                Ok(Ok(snapshot)) => {
                    for record in &snapshot.records {
                        println!("  {} {}", record.source_id.dimmed(), record.value);
                    }
                }
                Ok(Err(e)) => tracing::warn!(error = %e, "Stored snapshot is corrupt"),
                Err(e) => tracing::warn!(error = %e, "Snapshot not readable"),
            }
        }
        Event::RunFault { error, .. } => {
            eprintln!("{} {error}", "Run fault:".red().bold());
        }
    }
}
