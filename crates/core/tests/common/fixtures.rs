//! Test fixtures for creating sample projects and controllers.

use pr_core::config::loader::load_config;
use pr_core::engine::{Engine, LocalEngine};
use pr_core::resolve::{PipelineStore, StoreResolver};
use pr_core::stages::{
    Processor, StageDefinition, StageError, StageInstance, StageLibrary, Target,
};
use pr_core::ProductionRunController;
use pr_protocol::{ControllerSettings, Record, StageKind};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Unbounded sequence, paced so a run stays up until stopped.
pub const ENDLESS_PIPELINE: &str = "myPipeline";

/// Sequence of 25 records in batches of 10.
pub const FINITE_PIPELINE: &str = "finite";

/// Fails on its first batch through the `explode` processor.
pub const FAULTY_PIPELINE: &str = "faulty";

/// References a stage that does not exist.
pub const BROKEN_PIPELINE: &str = "broken";

/// Sequence of 25 records in batches of 5 into the `collect` target.
///
/// Only resolvable with [`collecting_library`].
pub const COLLECTED_PIPELINE: &str = "collected";

const ENDLESS_YAML: &str = r#"name: myPipeline
revision: "0"
description: endless sequence into the trash
batch-size: 10
batch-interval-ms: 5
stages:
  - instance-name: source
    stage-name: dev_sequence
    kind: source
  - instance-name: passthrough
    stage-name: identity
    kind: processor
  - instance-name: sink
    stage-name: trash
    kind: target
"#;

const FINITE_YAML: &str = r#"name: finite
batch-size: 10
batch-interval-ms: 1
stages:
  - instance-name: source
    stage-name: dev_sequence
    kind: source
    config:
      limit: 25
  - instance-name: tag
    stage-name: add_field
    kind: processor
    config:
      field: origin
      value: test
  - instance-name: sink
    stage-name: trash
    kind: target
"#;

const FAULTY_YAML: &str = r#"name: faulty
stages:
  - instance-name: source
    stage-name: dev_sequence
    kind: source
  - instance-name: bomb
    stage-name: explode
    kind: processor
  - instance-name: sink
    stage-name: trash
    kind: target
"#;

const COLLECTED_YAML: &str = r#"name: collected
batch-size: 5
batch-interval-ms: 20
stages:
  - instance-name: source
    stage-name: dev_sequence
    kind: source
    config:
      limit: 25
  - instance-name: tag
    stage-name: add_field
    kind: processor
    config:
      field: origin
      value: test
  - instance-name: sink
    stage-name: collect
    kind: target
"#;

const BROKEN_YAML: &str = r#"name: broken
stages:
  - instance-name: source
    stage-name: dev_sequence
    kind: source
  - instance-name: sink
    stage-name: kafka
    kind: target
"#;

/// Create a temporary project with `config.toml` and sample pipelines.
///
/// Revision "1" of the endless pipeline is also defined, identical to
/// revision "0". Returns a TempDir that must be kept alive for the test.
pub fn create_test_project() -> std::io::Result<TempDir> {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path();

    std::fs::create_dir_all(root.join("pipelines"))?;
    std::fs::write(
        root.join("config.toml"),
        "data-dir = \"data\"\nstartup-timeout-ms = 2000\n",
    )?;
    std::fs::write(root.join("pipelines/endless.yaml"), ENDLESS_YAML)?;
    std::fs::write(
        root.join("pipelines/endless-r1.yaml"),
        ENDLESS_YAML.replace("revision: \"0\"", "revision: \"1\""),
    )?;
    std::fs::write(root.join("pipelines/finite.yml"), FINITE_YAML)?;
    std::fs::write(root.join("pipelines/faulty.yaml"), FAULTY_YAML)?;
    std::fs::write(root.join("pipelines/broken.yaml"), BROKEN_YAML)?;
    std::fs::write(root.join("pipelines/collected.yaml"), COLLECTED_YAML)?;

    Ok(temp_dir)
}

struct Explode;

impl Processor for Explode {
    fn process(&mut self, _records: Vec<Record>) -> Result<Vec<Record>, StageError> {
        Err(StageError::failed("bomb", "boom"))
    }
}

/// Built-in stages plus `explode`, a processor that fails every batch.
pub fn test_library() -> Arc<StageLibrary> {
    let mut library = StageLibrary::with_builtin_stages();
    library.register(StageDefinition::new(
        "explode",
        StageKind::Processor,
        "Fails every batch",
        |_| Ok(StageInstance::Processor(Box::new(Explode))),
    ));
    Arc::new(library)
}

/// Records written to a `collect` target, in write order.
pub type Collected = Arc<Mutex<Vec<Record>>>;

struct Collect {
    sink: Collected,
}

impl Target for Collect {
    fn write(&mut self, records: &[Record]) -> Result<(), StageError> {
        self.sink
            .lock()
            .expect("collect sink poisoned")
            .extend_from_slice(records);
        Ok(())
    }
}

/// Built-in stages plus `collect`, a target appending to the returned sink.
pub fn collecting_library() -> (Arc<StageLibrary>, Collected) {
    let sink = Collected::default();
    let mut library = StageLibrary::with_builtin_stages();
    let shared = Arc::clone(&sink);
    library.register(StageDefinition::new(
        "collect",
        StageKind::Target,
        "Keeps written records in memory",
        move |_| {
            Ok(StageInstance::Target(Box::new(Collect {
                sink: Arc::clone(&shared),
            })))
        },
    ));
    (Arc::new(library), sink)
}

/// Controller over the project at `root`, running `library` on the local engine.
pub fn controller_with_library(root: &Path, library: Arc<StageLibrary>) -> ProductionRunController {
    let resolver = StoreResolver::new(PipelineStore::new(root.join("pipelines")), Arc::clone(&library));
    ProductionRunController::new(
        ControllerSettings::default(),
        &root.join("data"),
        Arc::new(resolver),
        Arc::new(LocalEngine::new(library)),
    )
}

/// Controller over the project at `root`, running on the local engine.
pub async fn create_controller(root: &Path) -> ProductionRunController {
    let config = load_config(root).await.expect("Failed to load config");
    ProductionRunController::from_config(&config, test_library())
}

/// Controller over the project at `root`, running on `engine`.
pub fn controller_with_engine(
    root: &Path,
    engine: Arc<dyn Engine>,
    settings: ControllerSettings,
) -> ProductionRunController {
    let resolver = StoreResolver::new(PipelineStore::new(root.join("pipelines")), test_library());
    ProductionRunController::new(settings, &root.join("data"), Arc::new(resolver), engine)
}

/// Create a project and an initialized local-engine controller over it.
pub async fn setup() -> (TempDir, ProductionRunController) {
    let project = create_test_project().expect("Failed to create test project");
    let controller = create_controller(project.path()).await;
    controller.init().await.expect("Failed to init controller");
    (project, controller)
}
