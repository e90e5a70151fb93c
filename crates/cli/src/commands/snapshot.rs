use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use pr_core::config::models::{AppConfig, RUN_INFO_DIR, SNAPSHOTS_DIR};
use pr_core::snapshot::{decode_snapshot, SnapshotStore};
use pr_core::state::tracker::STATE_FILE;
use pr_core::store::read_record;
use pr_core::ProductionRunController;
use pr_protocol::PipelineState;

use super::stage_library;

/// Execute `snapshot show`: print the stored snapshot of the last pipeline.
pub fn show(config: &AppConfig) -> Result<()> {
    let state: Option<PipelineState> =
        read_record(&config.data_dir().join(RUN_INFO_DIR).join(STATE_FILE))?;
    let Some(pipeline) = state.and_then(|s| s.name) else {
        bail!("No pipeline has been run yet");
    };

    let store = SnapshotStore::new(&config.data_dir().join(SNAPSHOTS_DIR));
    let Some(file) = store.open(&pipeline)? else {
        bail!("No snapshot stored for pipeline '{pipeline}'");
    };
    let snapshot = decode_snapshot(file).wrap_err("Stored snapshot is corrupt")?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Execute `snapshot delete`.
pub async fn delete(config: &AppConfig) -> Result<()> {
    let controller = ProductionRunController::from_config(config, stage_library());
    controller.init().await?;
    controller.delete_snapshot()?;
    println!("Snapshot deleted");
    Ok(())
}
