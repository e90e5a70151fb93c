pub mod offset;
pub mod run;
pub mod snapshot;
pub mod status;
pub mod validate;

use colored::{ColoredString, Colorize};
use pr_core::stages::StageLibrary;
use pr_protocol::PipelineStatus;
use std::sync::Arc;

/// Stage library available to the CLI.
pub fn stage_library() -> Arc<StageLibrary> {
    Arc::new(StageLibrary::with_builtin_stages())
}

/// Status label colored by lifecycle outcome.
pub fn paint(status: PipelineStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        PipelineStatus::Running | PipelineStatus::Finished => label.green().bold(),
        PipelineStatus::Starting | PipelineStatus::Stopping => label.yellow(),
        PipelineStatus::RunError => label.red().bold(),
        PipelineStatus::Edited | PipelineStatus::NotRunning => label.normal(),
    }
}
