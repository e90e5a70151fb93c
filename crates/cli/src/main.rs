mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "prodrun",
    version,
    about = "Run, stop, inspect and recover a production pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root holding config.toml and pipelines/
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Log level (error, warn, info, debug, trace); overrides config.toml
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline revision against the stage library
    Validate {
        /// Pipeline name
        name: String,
        /// Pipeline revision
        #[arg(default_value = "0")]
        revision: String,
    },
    /// Run a pipeline until it finishes, fails, or is interrupted
    Run {
        /// Pipeline name
        name: String,
        /// Pipeline revision
        #[arg(default_value = "0")]
        revision: String,
        /// Capture a snapshot of this many records and print it
        #[arg(long)]
        snapshot: Option<usize>,
        /// Stop the run after this many milliseconds
        #[arg(long)]
        for_ms: Option<u64>,
    },
    /// Show the persisted pipeline state, offset and snapshot status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or delete the stored snapshot
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// Forget the committed offset so the next run starts from the beginning
    ResetOffset,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// Print the stored snapshot as JSON
    Show,
    /// Delete the stored snapshot
    Delete,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = pr_core::config::loader::load_config(&cli.root).await?;
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    pr_core::logging::init(&log_level);

    match cli.command {
        Commands::Validate { name, revision } => {
            commands::validate::execute(&config, &name, &revision)
        }
        Commands::Run {
            name,
            revision,
            snapshot,
            for_ms,
        } => commands::run::execute(&config, &name, &revision, snapshot, for_ms).await,
        Commands::Status { json } => commands::status::execute(&config, json),
        Commands::Snapshot { action } => match action {
            SnapshotAction::Show => commands::snapshot::show(&config),
            SnapshotAction::Delete => commands::snapshot::delete(&config).await,
        },
        Commands::ResetOffset => commands::offset::reset(&config).await,
    }
}
