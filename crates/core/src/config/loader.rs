//! Configuration loader for a project root directory.
//!
//! This module loads and parses the configuration files of a project:
//! - `config.toml`: Controller settings
//! - `pipelines/*.yaml`: Pipeline definitions

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use pr_protocol::config_models::ControllerSettings;
use pr_protocol::pipeline_models::PipelineDefinition;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use walkdir::WalkDir;

/// File name of the controller settings inside the project root.
pub const CONFIG_FILE: &str = "config.toml";

/// Directory holding pipeline definitions inside the project root.
pub const PIPELINES_DIR: &str = "pipelines";

/// Loads all configuration from a project root.
///
/// This function loads:
/// - Controller settings from `config.toml`
/// - Pipeline definitions from `pipelines/*.yaml` files
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. Missing files or
/// directories fall back to defaults rather than errors.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid TOML or YAML syntax
/// - Two files define the same pipeline revision
///
/// # Example
///
/// ```rust,no_run
/// use pr_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} pipelines", config.pipelines.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let settings = load_settings(root)?;
    let pipelines = load_pipelines(&root.join(PIPELINES_DIR))?;

    Ok(AppConfig {
        root: root.to_path_buf(),
        settings,
        pipelines,
    })
}

/// Loads controller settings from `config.toml`.
pub fn load_settings(root: &Path) -> ConfigResult<ControllerSettings> {
    let config_path = root.join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(ControllerSettings::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path,
        source,
    })
}

/// Loads all pipeline definitions from a directory of `*.yaml`/`*.yml` files.
///
/// Definitions are returned sorted by name, then revision.
pub fn load_pipelines(pipelines_dir: &Path) -> ConfigResult<Vec<PipelineDefinition>> {
    if !pipelines_dir.exists() {
        return Ok(Vec::new());
    }

    let mut seen: HashMap<(String, String), PathBuf> = HashMap::new();
    let mut pipelines = Vec::new();

    for entry in WalkDir::new(pipelines_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: pipelines_dir.to_path_buf(),
            source,
        })?;

        let path = entry.path();

        if !is_yaml(path) {
            continue;
        }

        let pipeline = load_pipeline_file(path)?;

        let key = (pipeline.name.clone(), pipeline.revision.clone());
        if let Some(first) = seen.get(&key) {
            return Err(ConfigError::DuplicatePipeline {
                name: key.0,
                revision: key.1,
                first: first.clone(),
                second: path.to_path_buf(),
            });
        }
        seen.insert(key, path.to_path_buf());

        pipelines.push(pipeline);
    }

    pipelines.sort_by(|a, b| (&a.name, &a.revision).cmp(&(&b.name, &b.revision)));
    Ok(pipelines)
}

/// Parses a single pipeline definition file.
pub fn load_pipeline_file(path: &Path) -> ConfigResult<PipelineDefinition> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
        path: path.to_path_buf(),
        source,
    })
}

fn is_yaml(path: &Path) -> bool {
    let ext = path.extension().and_then(|s| s.to_str());
    ext == Some("yaml") || ext == Some("yml")
}
