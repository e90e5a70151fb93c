//! Scripted engine for driving the controller through runner edge cases.

use async_trait::async_trait;
use pr_core::engine::{Engine, EngineError, RunContext, RunnerCommand, Termination};
use pr_protocol::Record;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a scripted runner does after launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Confirm startup, answer captures with fake records, stop on request.
    Cooperative,

    /// Never confirm startup.
    NeverStarts,

    /// Report a fault instead of confirming startup.
    FaultOnStart(String),

    /// Confirm startup, then exit without a terminal event.
    VanishAfterStart,

    /// Confirm startup; when stopped, commit `offset` before terminating.
    LateOffsetOnStop(String),

    /// Confirm startup; when stopped, report a fault.
    FaultOnStop(String),

    /// Fail the launch itself.
    RejectLaunch,

    /// Confirm startup; answer the n-th capture after the n-th delay in
    /// milliseconds, with records whose keys start with `capture-<n>::`.
    DelayedCaptures(Vec<u64>),

    /// Confirm startup, then finish on its own after the given milliseconds.
    FinishAfterMs(u64),
}

/// [`Engine`] whose runners follow a [`Script`].
pub struct ScriptedEngine {
    script: Script,
    launches: AtomicUsize,
    offsets_seen: Arc<Mutex<Vec<Option<String>>>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            launches: AtomicUsize::new(0),
            offsets_seen: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Number of runs launched.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Initial offsets handed to each launched run.
    pub fn initial_offsets(&self) -> Vec<Option<String>> {
        self.offsets_seen.lock().unwrap().clone()
    }
}

fn fake_records(prefix: &str, count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::new(format!("{prefix}::{i}"), serde_json::json!({ "i": i })))
        .collect()
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn launch(&self, context: RunContext) -> Result<JoinHandle<()>, EngineError> {
        if self.script == Script::RejectLaunch {
            return Err(EngineError::Launch {
                pipeline: context.pipeline.name().to_string(),
                reason: "scripted rejection".to_string(),
            });
        }

        self.launches.fetch_add(1, Ordering::SeqCst);
        self.offsets_seen
            .lock()
            .unwrap()
            .push(context.initial_offset.clone());

        let script = self.script.clone();
        let RunContext {
            mut commands,
            events,
            ..
        } = context;

        Ok(tokio::spawn(async move {
            match script {
                Script::NeverStarts => {
                    while commands.recv().await.is_some() {}
                    return;
                }
                Script::FaultOnStart(error) => {
                    events.fault(error).await;
                    return;
                }
                _ => {
                    events.started().await;
                }
            }

            match &script {
                Script::VanishAfterStart => return,
                Script::FinishAfterMs(ms) => {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    events.terminated(Termination::Finished).await;
                    return;
                }
                _ => {}
            }

            let mut captures = 0;
            while let Some(command) = commands.recv().await {
                match command {
                    RunnerCommand::Capture { id, batch_size } => {
                        if let Script::DelayedCaptures(delays) = &script {
                            let delay = delays.get(captures).copied().unwrap_or_default();
                            let records = fake_records(&format!("capture-{captures}"), batch_size);
                            let events = events.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(Duration::from_millis(delay)).await;
                                events.capture_complete(id, records).await;
                            });
                        } else {
                            events.capture_complete(id, fake_records("fake", batch_size)).await;
                        }
                        captures += 1;
                    }
                    RunnerCommand::Stop => {
                        match &script {
                            Script::LateOffsetOnStop(offset) => {
                                events.offset_committed(offset.clone()).await;
                                events.terminated(Termination::Stopped).await;
                            }
                            Script::FaultOnStop(error) => {
                                events.fault(error.clone()).await;
                            }
                            _ => {
                                events.terminated(Termination::Stopped).await;
                            }
                        }
                        return;
                    }
                }
            }
        }))
    }
}
