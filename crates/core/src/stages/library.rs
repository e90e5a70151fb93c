//! Stage library for resolving stage names to implementations.
//!
//! The `StageLibrary` is responsible for:
//! - Registering stage definitions (built-in or custom)
//! - Looking up stages by name
//! - Instantiating stages from pipeline configuration

use crate::stages::{builtin, StageError, StageInstance};
use pr_protocol::{StageConfig, StageKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type StageFactory = Arc<dyn Fn(&StageConfig) -> Result<StageInstance, StageError> + Send + Sync>;

/// A named stage implementation and the factory that builds it.
#[derive(Clone)]
pub struct StageDefinition {
    pub name: String,
    pub kind: StageKind,
    pub description: String,
    factory: StageFactory,
}

impl StageDefinition {
    pub fn new<F>(name: &str, kind: StageKind, description: &str, factory: F) -> Self
    where
        F: Fn(&StageConfig) -> Result<StageInstance, StageError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Registry of every stage a pipeline may reference.
#[derive(Debug, Clone, Default)]
pub struct StageLibrary {
    stages: HashMap<String, StageDefinition>,
}

impl StageLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a library holding the built-in development stages.
    pub fn with_builtin_stages() -> Self {
        let mut library = Self::new();
        for definition in builtin::definitions() {
            library.register(definition);
        }
        library
    }

    /// Register `definition`, replacing any stage with the same name.
    pub fn register(&mut self, definition: StageDefinition) {
        self.stages.insert(definition.name.clone(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.get(name)
    }

    pub fn has_stage(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// All registered stage names, sorted.
    pub fn list_stages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stages.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the stage described by `config`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the stage is unknown, is registered with a different
    /// kind than declared, or rejects its settings.
    pub fn instantiate(&self, config: &StageConfig) -> Result<StageInstance, StageError> {
        let definition = self
            .get(&config.stage_name)
            .ok_or_else(|| StageError::InvalidConfig {
                stage: config.instance_name.clone(),
                reason: format!("unknown stage '{}'", config.stage_name),
            })?;

        if definition.kind != config.kind {
            return Err(StageError::InvalidConfig {
                stage: config.instance_name.clone(),
                reason: format!(
                    "stage '{}' is a {:?}, declared as {:?}",
                    definition.name, definition.kind, config.kind
                ),
            });
        }

        let instance = (definition.factory)(config)?;
        if instance.kind() != definition.kind {
            return Err(StageError::InvalidConfig {
                stage: config.instance_name.clone(),
                reason: format!("factory for '{}' built the wrong kind of stage", definition.name),
            });
        }
        Ok(instance)
    }
}
