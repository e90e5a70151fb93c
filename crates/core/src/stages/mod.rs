//! Stage abstractions and the stage library.
//!
//! A pipeline is a chain of stages: one [`Source`] that owns the offset
//! token, any number of [`Processor`]s, and one [`Target`]. Implementations
//! are registered in a [`StageLibrary`] under a stage name and instantiated
//! per run from the pipeline's [`StageConfig`](pr_protocol::StageConfig).

pub mod builtin;
pub mod library;

pub use library::{StageDefinition, StageLibrary};

use pr_protocol::{Record, StageConfig, StageKind};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised by stage construction or execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("Invalid configuration for stage '{stage}': {reason}")]
    InvalidConfig { stage: String, reason: String },

    #[error("Stage '{stage}' failed: {reason}")]
    Failed { stage: String, reason: String },
}

impl StageError {
    pub fn failed(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Records read by a source in one call, with the position after them.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    pub records: Vec<Record>,

    /// Offset token to commit once the batch has been written.
    pub offset: String,

    /// The source has no more input after this batch.
    pub exhausted: bool,
}

pub trait Source: Send {
    /// Read up to `max_records` starting after `offset` (`None` = beginning).
    fn produce(&mut self, offset: Option<&str>, max_records: usize)
        -> Result<SourceBatch, StageError>;
}

pub trait Processor: Send {
    fn process(&mut self, records: Vec<Record>) -> Result<Vec<Record>, StageError>;
}

pub trait Target: Send {
    fn write(&mut self, records: &[Record]) -> Result<(), StageError>;
}

/// A constructed stage, ready to run.
pub enum StageInstance {
    Source(Box<dyn Source>),
    Processor(Box<dyn Processor>),
    Target(Box<dyn Target>),
}

impl StageInstance {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Source(_) => StageKind::Source,
            Self::Processor(_) => StageKind::Processor,
            Self::Target(_) => StageKind::Target,
        }
    }
}

/// Deserialize the stage-specific settings of `config`.
///
/// A missing (`null`) settings block deserializes as an empty map, so stages
/// whose settings all have defaults need no `config:` entry.
pub fn parse_stage_config<T: DeserializeOwned>(config: &StageConfig) -> Result<T, StageError> {
    let value = if config.config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config.config.clone()
    };
    serde_json::from_value(value).map_err(|e| StageError::InvalidConfig {
        stage: config.instance_name.clone(),
        reason: e.to_string(),
    })
}
