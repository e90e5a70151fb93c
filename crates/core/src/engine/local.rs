//! In-process engine running a validated pipeline on a tokio task.
//!
//! The run loop works batch by batch:
//! 1. Apply pending commands (stop, capture)
//! 2. Read up to `batch-size` records from the source at the current offset
//! 3. Pass them through every processor, then write them to the target
//! 4. Feed an armed capture with the records that reached the target
//! 5. Commit the offset returned by the source
//! 6. Finish when the source is exhausted, otherwise pause `batch-interval-ms`

use crate::engine::{Engine, EngineError, RunContext, RunnerCommand, RunnerEvents, Termination};
use crate::stages::{Processor, Source, SourceBatch, StageError, StageInstance, StageLibrary, Target};
use async_trait::async_trait;
use pr_protocol::{PipelineDefinition, Record};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

/// [`Engine`] that executes stages from a [`StageLibrary`] in-process.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    library: Arc<StageLibrary>,
}

impl LocalEngine {
    pub fn new(library: Arc<StageLibrary>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl Engine for LocalEngine {
    async fn launch(&self, context: RunContext) -> Result<JoinHandle<()>, EngineError> {
        let library = Arc::clone(&self.library);
        Ok(tokio::spawn(execute(library, context)))
    }
}

struct StageChain {
    source: Box<dyn Source>,
    processors: Vec<Box<dyn Processor>>,
    target: Box<dyn Target>,
}

impl StageChain {
    fn build(library: &StageLibrary, definition: &PipelineDefinition) -> Result<Self, StageError> {
        let mut source = None;
        let mut processors = Vec::new();
        let mut target = None;

        for config in &definition.stages {
            match library.instantiate(config)? {
                StageInstance::Source(stage) if source.is_none() => source = Some(stage),
                StageInstance::Processor(stage) if target.is_none() => processors.push(stage),
                StageInstance::Target(stage) if target.is_none() => target = Some(stage),
                _ => {
                    return Err(StageError::InvalidConfig {
                        stage: config.instance_name.clone(),
                        reason: "stage is out of order".to_string(),
                    })
                }
            }
        }

        match (source, target) {
            (Some(source), Some(target)) => Ok(Self {
                source,
                processors,
                target,
            }),
            _ => Err(StageError::InvalidConfig {
                stage: definition.name.clone(),
                reason: "pipeline needs a source and a target".to_string(),
            }),
        }
    }

    fn run_batch(
        &mut self,
        offset: Option<&str>,
        max_records: usize,
    ) -> Result<SourceBatch, StageError> {
        let mut batch = self.source.produce(offset, max_records)?;
        let mut records = std::mem::take(&mut batch.records);
        for processor in &mut self.processors {
            records = processor.process(records)?;
        }
        self.target.write(&records)?;
        batch.records = records;
        Ok(batch)
    }
}

struct PendingCapture {
    id: u64,
    batch_size: usize,
    records: Vec<Record>,
}

impl PendingCapture {
    fn new(id: u64, batch_size: usize) -> Self {
        Self {
            id,
            batch_size,
            records: Vec::new(),
        }
    }

    /// Copy records until the capture is full. Returns true once it is.
    fn feed(&mut self, records: &[Record]) -> bool {
        let room = self.batch_size.saturating_sub(self.records.len());
        self.records.extend(records.iter().take(room).cloned());
        self.records.len() >= self.batch_size
    }
}

async fn execute(library: Arc<StageLibrary>, context: RunContext) {
    let RunContext {
        run_id,
        pipeline,
        initial_offset,
        mut commands,
        events,
    } = context;
    let definition = pipeline.definition();

    let mut chain = match StageChain::build(&library, definition) {
        Ok(chain) => chain,
        Err(e) => {
            tracing::error!(run_id = %run_id, pipeline = %definition.name, error = %e, "Failed to build stages");
            events.fault(e.to_string()).await;
            return;
        }
    };

    if !events.started().await {
        return;
    }
    tracing::info!(
        run_id = %run_id,
        pipeline = %definition.name,
        revision = %definition.revision,
        offset = ?initial_offset,
        "Pipeline run started"
    );

    let interval = Duration::from_millis(definition.batch_interval_ms);
    let mut offset = initial_offset;
    let mut capture: Option<PendingCapture> = None;

    loop {
        loop {
            match commands.try_recv() {
                Ok(RunnerCommand::Stop) => {
                    tracing::info!(run_id = %run_id, pipeline = %definition.name, "Pipeline run stopped");
                    events.terminated(Termination::Stopped).await;
                    return;
                }
                Ok(RunnerCommand::Capture { id, batch_size }) => {
                    capture = Some(PendingCapture::new(id, batch_size));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!(run_id = %run_id, "Supervisor gone, abandoning run");
                    return;
                }
            }
        }

        let batch = match chain.run_batch(offset.as_deref(), definition.batch_size) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(run_id = %run_id, pipeline = %definition.name, error = %e, "Batch failed");
                events.fault(e.to_string()).await;
                return;
            }
        };

        if let Some(pending) = capture.as_mut() {
            if pending.feed(&batch.records) {
                let id = pending.id;
                let records = std::mem::take(&mut pending.records);
                capture = None;
                if !events.capture_complete(id, records).await {
                    return;
                }
            }
        }

        if !events.offset_committed(batch.offset.clone()).await {
            return;
        }
        offset = Some(batch.offset);

        if batch.exhausted {
            if let Some(pending) = capture.take() {
                events.capture_complete(pending.id, pending.records).await;
            }
            tracing::info!(run_id = %run_id, pipeline = %definition.name, offset = ?offset, "Pipeline run finished");
            events.terminated(Termination::Finished).await;
            return;
        }

        if interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(interval).await;
        }
    }
}
