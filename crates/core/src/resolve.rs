//! Pipeline resolution and validation.
//!
//! A run can only be launched from a [`ValidatedPipeline`], which is produced
//! by a [`PipelineResolver`]. The file-backed [`StoreResolver`] reads the
//! definition from a [`PipelineStore`] and checks it against a
//! [`StageLibrary`].

use crate::config::error::ConfigError;
use crate::config::loader::load_pipelines;
use crate::stages::StageLibrary;
use pr_protocol::{PipelineDefinition, StageKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while resolving a pipeline.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Pipeline '{name}' revision '{revision}' not found")]
    PipelineNotFound { name: String, revision: String },

    #[error("Failed to load pipeline definitions: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline '{name}' revision '{revision}' is invalid: {}", .issues.join("; "))]
    Invalid {
        name: String,
        revision: String,
        issues: Vec<String>,
    },
}

/// A pipeline definition that passed validation.
///
/// Only [`validate`] constructs this type.
#[derive(Debug, Clone)]
pub struct ValidatedPipeline {
    definition: PipelineDefinition,
}

impl ValidatedPipeline {
    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn revision(&self) -> &str {
        &self.definition.revision
    }
}

/// Resolves a (name, revision) pair to a launchable pipeline.
pub trait PipelineResolver: Send + Sync {
    fn resolve(&self, name: &str, revision: &str) -> Result<ValidatedPipeline, ValidationError>;
}

/// Directory of pipeline definition files.
///
/// Definitions are re-read on every lookup so that edits are picked up by
/// the next start.
#[derive(Debug, Clone)]
pub struct PipelineStore {
    dir: PathBuf,
}

impl PipelineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn list(&self) -> Result<Vec<PipelineDefinition>, ConfigError> {
        load_pipelines(&self.dir)
    }

    pub fn load(
        &self,
        name: &str,
        revision: &str,
    ) -> Result<Option<PipelineDefinition>, ConfigError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|p| p.name == name && p.revision == revision))
    }
}

/// [`PipelineResolver`] backed by a [`PipelineStore`] and a [`StageLibrary`].
#[derive(Debug, Clone)]
pub struct StoreResolver {
    store: PipelineStore,
    library: Arc<StageLibrary>,
}

impl StoreResolver {
    pub fn new(store: PipelineStore, library: Arc<StageLibrary>) -> Self {
        Self { store, library }
    }

    pub fn store(&self) -> &PipelineStore {
        &self.store
    }

    pub fn library(&self) -> &Arc<StageLibrary> {
        &self.library
    }
}

impl PipelineResolver for StoreResolver {
    fn resolve(&self, name: &str, revision: &str) -> Result<ValidatedPipeline, ValidationError> {
        let definition =
            self.store
                .load(name, revision)?
                .ok_or_else(|| ValidationError::PipelineNotFound {
                    name: name.to_string(),
                    revision: revision.to_string(),
                })?;
        validate(definition, &self.library)
    }
}

/// Largest accepted `batch-size`. A batch is held in memory in full.
pub const MAX_BATCH_SIZE: usize = 100_000;

/// Check `definition` against `library`, collecting every issue found.
pub fn validate(
    definition: PipelineDefinition,
    library: &StageLibrary,
) -> Result<ValidatedPipeline, ValidationError> {
    let mut issues = Vec::new();

    if !is_valid_pipeline_name(&definition.name) {
        issues.push(format!(
            "pipeline name '{}' must be non-empty and use only letters, digits, '_', '-' or '.'",
            definition.name
        ));
    }

    if definition.batch_size == 0 {
        issues.push("batch-size must be greater than zero".to_string());
    } else if definition.batch_size > MAX_BATCH_SIZE {
        issues.push(format!(
            "batch-size {} exceeds the maximum of {MAX_BATCH_SIZE}",
            definition.batch_size
        ));
    }

    let stages = &definition.stages;
    if stages.is_empty() {
        issues.push("pipeline has no stages".to_string());
    } else if stages.len() < 2 {
        issues.push("pipeline needs at least a source and a target".to_string());
    }

    let last = stages.len().saturating_sub(1);
    let mut names = HashSet::new();
    for (position, stage) in stages.iter().enumerate() {
        let expected = if position == 0 {
            StageKind::Source
        } else if position == last {
            StageKind::Target
        } else {
            StageKind::Processor
        };
        if stage.kind != expected {
            issues.push(format!(
                "stage {} ('{}') is declared as {:?}, expected {:?} at this position",
                position, stage.instance_name, stage.kind, expected
            ));
        }

        if stage.instance_name.trim().is_empty() {
            issues.push(format!("stage {position} has an empty instance name"));
        } else if !names.insert(stage.instance_name.as_str()) {
            issues.push(format!(
                "instance name '{}' is used more than once",
                stage.instance_name
            ));
        }

        if let Err(e) = library.instantiate(stage) {
            issues.push(e.to_string());
        }
    }

    if issues.is_empty() {
        Ok(ValidatedPipeline { definition })
    } else {
        Err(ValidationError::Invalid {
            name: definition.name,
            revision: definition.revision,
            issues,
        })
    }
}

/// Pipeline names double as directory names in the data directory.
fn is_valid_pipeline_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pr_protocol::StageConfig;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn stage(instance: &str, stage: &str, kind: StageKind) -> StageConfig {
        StageConfig {
            instance_name: instance.to_string(),
            stage_name: stage.to_string(),
            kind,
            config: serde_json::Value::Null,
        }
    }

    fn definition(stages: Vec<StageConfig>) -> PipelineDefinition {
        PipelineDefinition {
            name: "orders".to_string(),
            revision: "3".to_string(),
            description: String::new(),
            batch_size: 10,
            batch_interval_ms: 0,
            stages,
        }
    }

    fn issues_of(result: Result<ValidatedPipeline, ValidationError>) -> Vec<String> {
        match result {
            Err(ValidationError::Invalid { issues, .. }) => issues,
            other => panic!("Expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_chain_passes() {
        let library = StageLibrary::with_builtin_stages();
        let validated = validate(
            definition(vec![
                stage("src", "dev_sequence", StageKind::Source),
                stage("noop", "identity", StageKind::Processor),
                stage("sink", "trash", StageKind::Target),
            ]),
            &library,
        )
        .expect("valid pipeline");

        assert_eq!(validated.name(), "orders");
        assert_eq!(validated.revision(), "3");
        assert_eq!(validated.definition().stages.len(), 3);
    }

    #[test]
    fn test_empty_pipeline_is_invalid() {
        let library = StageLibrary::with_builtin_stages();
        let issues = issues_of(validate(definition(vec![]), &library));
        assert_eq!(issues, vec!["pipeline has no stages".to_string()]);
    }

    #[test]
    fn test_wrong_positions_and_duplicates_are_reported() {
        let library = StageLibrary::with_builtin_stages();
        let issues = issues_of(validate(
            definition(vec![
                stage("a", "trash", StageKind::Target),
                stage("a", "dev_sequence", StageKind::Source),
            ]),
            &library,
        ));

        assert!(issues.iter().any(|i| i.contains("expected Source")));
        assert!(issues.iter().any(|i| i.contains("expected Target")));
        assert!(issues.iter().any(|i| i.contains("used more than once")));
    }

    #[test]
    fn test_unknown_stage_and_bad_config_are_reported() {
        let library = StageLibrary::with_builtin_stages();
        let mut source = stage("src", "dev_sequence", StageKind::Source);
        source.config = json!({"limit": "many"});
        let issues = issues_of(validate(
            definition(vec![source, stage("sink", "kafka", StageKind::Target)]),
            &library,
        ));

        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("src"));
        assert!(issues[1].contains("unknown stage 'kafka'"));
    }

    #[test]
    fn test_zero_batch_size_and_bad_name_are_reported() {
        let library = StageLibrary::with_builtin_stages();
        let mut def = definition(vec![
            stage("src", "dev_sequence", StageKind::Source),
            stage("sink", "trash", StageKind::Target),
        ]);
        def.batch_size = 0;
        def.name = "../escape".to_string();

        let issues = issues_of(validate(def, &library));

        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_oversized_batch_size_is_reported() {
        let library = StageLibrary::with_builtin_stages();
        let mut def = definition(vec![
            stage("src", "dev_sequence", StageKind::Source),
            stage("sink", "trash", StageKind::Target),
        ]);
        def.batch_size = usize::MAX;

        let issues = issues_of(validate(def.clone(), &library));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("exceeds the maximum"));

        def.batch_size = MAX_BATCH_SIZE;
        assert!(validate(def, &library).is_ok());
    }

    #[test]
    fn test_pipeline_names() {
        assert!(is_valid_pipeline_name("my-pipeline_v1.2"));
        assert!(!is_valid_pipeline_name(""));
        assert!(!is_valid_pipeline_name(".."));
        assert!(!is_valid_pipeline_name("a/b"));
        assert!(!is_valid_pipeline_name("with space"));
    }

    #[test]
    fn test_store_resolver_reads_definitions_from_disk() {
        let dir = tempdir().expect("temp dir");
        fs::write(
            dir.path().join("orders.yaml"),
            r#"name: orders
revision: "3"
stages:
  - instance-name: src
    stage-name: dev_sequence
    kind: source
  - instance-name: sink
    stage-name: trash
    kind: target
"#,
        )
        .expect("write pipeline");
        let resolver = StoreResolver::new(
            PipelineStore::new(dir.path()),
            Arc::new(StageLibrary::with_builtin_stages()),
        );

        let validated = resolver.resolve("orders", "3").expect("resolves");
        assert_eq!(validated.definition().batch_size, 100);

        match resolver.resolve("orders", "4") {
            Err(ValidationError::PipelineNotFound { name, revision }) => {
                assert_eq!(name, "orders");
                assert_eq!(revision, "4");
            }
            other => panic!("Expected PipelineNotFound, got {other:?}"),
        }
        assert!(matches!(
            resolver.resolve("xyz", "0"),
            Err(ValidationError::PipelineNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_directory_means_not_found() {
        let dir = tempdir().expect("temp dir");
        let resolver = StoreResolver::new(
            PipelineStore::new(dir.path().join("absent")),
            Arc::new(StageLibrary::with_builtin_stages()),
        );

        assert!(matches!(
            resolver.resolve("orders", "0"),
            Err(ValidationError::PipelineNotFound { .. })
        ));
    }
}
