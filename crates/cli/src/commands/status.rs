use color_eyre::Result;
use pr_core::config::models::{AppConfig, RUN_INFO_DIR, SNAPSHOTS_DIR};
use pr_core::offset::{OffsetRecord, OFFSET_FILE};
use pr_core::snapshot::SnapshotStore;
use pr_core::state::tracker::STATE_FILE;
use pr_core::store::read_record;
use pr_protocol::PipelineState;

use super::paint;

/// Execute the `status` command.
///
/// Reads the durable records directly and never reconciles them, so it is
/// safe to run next to a live controller.
pub fn execute(config: &AppConfig, json: bool) -> Result<()> {
    let run_info = config.data_dir().join(RUN_INFO_DIR);
    let state: PipelineState = read_record(&run_info.join(STATE_FILE))?.unwrap_or_default();
    let offset: OffsetRecord = read_record(&run_info.join(OFFSET_FILE))?.unwrap_or_default();
    let snapshot_exists = state
        .name
        .as_deref()
        .is_some_and(|name| SnapshotStore::new(&config.data_dir().join(SNAPSHOTS_DIR)).exists(name));

    if json {
        let report = serde_json::json!({
            "state": state,
            "offset": offset,
            "snapshotExists": snapshot_exists,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Pipeline: {}@{}",
        state.name.as_deref().unwrap_or("-"),
        state.revision.as_deref().unwrap_or("-")
    );
    println!("Status:   {}", paint(state.status));
    println!("Since:    {}", state.timestamp.to_rfc3339());
    if let Some(message) = &state.message {
        println!("Message:  {message}");
    }
    println!("Offset:   {}", offset.offset.as_deref().unwrap_or("-"));
    println!("Snapshot: {}", if snapshot_exists { "stored" } else { "-" });
    Ok(())
}
