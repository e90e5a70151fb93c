//! Pipeline definition models for `pipelines/*.yaml`.
//!
//! This module defines the structure of pipeline definition files. A
//! definition names an ordered chain of stages: one source, any number of
//! processors and one target.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Role of a stage within the pipeline chain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Reads records and owns the offset token.
    Source,

    /// Transforms records in flight.
    Processor,

    /// Writes records out of the pipeline.
    Target,
}

/// Configuration of one stage instance in a pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct StageConfig {
    /// Name of this instance, unique within the pipeline.
    pub instance_name: String,

    /// Name of the stage implementation in the stage library.
    pub stage_name: String,

    /// Declared role of the stage.
    pub kind: StageKind,

    /// Stage-specific settings, interpreted by the stage implementation.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A full pipeline definition at a given revision.
///
/// # Example
///
/// ```yaml
/// name: myPipeline
/// revision: "0"
/// description: sequence into the trash
/// batch-size: 10
/// batch-interval-ms: 5
/// stages:
///   - instance-name: source
///     stage-name: dev_sequence
///     kind: source
///   - instance-name: tag
///     stage-name: add_field
///     kind: processor
///     config:
///       field: origin
///       value: dev
///   - instance-name: sink
///     stage-name: trash
///     kind: target
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineDefinition {
    /// Unique name identifying this pipeline.
    pub name: String,

    /// Revision of the definition. Runs are identified by (name, revision).
    #[serde(default = "default_revision")]
    pub revision: String,

    #[serde(default)]
    pub description: String,

    /// Maximum number of records the source is asked for per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches, in milliseconds.
    #[serde(default)]
    pub batch_interval_ms: u64,

    /// Ordered stage chain.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

fn default_revision() -> String {
    "0".to_string()
}

fn default_batch_size() -> usize {
    100
}
