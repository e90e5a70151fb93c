use color_eyre::Result;
use pr_core::config::models::AppConfig;
use pr_core::ProductionRunController;

use super::stage_library;

/// Execute `reset-offset`.
pub async fn reset(config: &AppConfig) -> Result<()> {
    let controller = ProductionRunController::from_config(config, stage_library());
    controller.init().await?;
    controller.reset_offset().await?;

    let record = controller.get_offset_record()?;
    println!(
        "Offset of {}@{} reset",
        record.pipeline.as_deref().unwrap_or("-"),
        record.revision.as_deref().unwrap_or("-")
    );
    Ok(())
}
