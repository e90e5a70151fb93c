use colored::Colorize;
use color_eyre::eyre::bail;
use color_eyre::Result;
use pr_core::config::models::AppConfig;
use pr_core::resolve::{PipelineResolver, PipelineStore, StoreResolver, ValidationError};

use super::stage_library;

/// Execute the `validate` command.
pub fn execute(config: &AppConfig, name: &str, revision: &str) -> Result<()> {
    let resolver = StoreResolver::new(PipelineStore::new(config.pipelines_dir()), stage_library());

    match resolver.resolve(name, revision) {
        Ok(pipeline) => {
            println!("{} {}@{}", "valid".green().bold(), name, revision);
            for stage in &pipeline.definition().stages {
                println!(
                    "  {:10} {:20} {}",
                    format!("{:?}", stage.kind).to_lowercase(),
                    stage.instance_name,
                    stage.stage_name.dimmed()
                );
            }
            Ok(())
        }
        Err(ValidationError::Invalid { issues, .. }) => {
            println!("{} {}@{}", "invalid".red().bold(), name, revision);
            for issue in &issues {
                println!("  - {issue}");
            }
            bail!("{} issue(s) found", issues.len())
        }
        Err(e) => Err(e.into()),
    }
}
