//! Configuration models that aggregate all settings.
//!
//! This module provides the unified `AppConfig` structure that combines
//! controller settings and pipeline definitions into a single configuration
//! object.

use pr_protocol::config_models::ControllerSettings;
use pr_protocol::pipeline_models::PipelineDefinition;
use std::path::{Path, PathBuf};

/// Name of the run info directory inside the data directory.
pub const RUN_INFO_DIR: &str = "runInfo";

/// Name of the snapshot directory inside the data directory.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Unified application configuration loaded from a project root.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: Controller settings
/// - `pipelines/*.yaml`: Pipeline definitions
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Project root the configuration was loaded from.
    pub root: PathBuf,

    /// Controller settings from `config.toml`.
    pub settings: ControllerSettings,

    /// All pipeline definitions loaded from `pipelines/*.yaml`.
    pub pipelines: Vec<PipelineDefinition>,
}

impl AppConfig {
    /// Defaults for a project rooted at `root`.
    pub fn with_root(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            settings: ControllerSettings::default(),
            pipelines: Vec::new(),
        }
    }

    /// Data directory, resolved against the root when relative.
    pub fn data_dir(&self) -> PathBuf {
        resolve_data_dir(&self.root, &self.settings)
    }

    /// Directory holding pipeline definition files.
    pub fn pipelines_dir(&self) -> PathBuf {
        self.root.join(crate::config::loader::PIPELINES_DIR)
    }
}

/// Resolve `settings.data_dir` against `root` when it is relative.
pub fn resolve_data_dir(root: &Path, settings: &ControllerSettings) -> PathBuf {
    let dir = Path::new(&settings.data_dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        root.join(dir)
    }
}
