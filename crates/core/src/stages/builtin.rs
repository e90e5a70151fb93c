//! Built-in development stages.
//!
//! - `dev_sequence` (source): emits `{"seq": n}` records counting up from the
//!   committed offset, optionally stopping at `limit`
//! - `identity` (processor): passes records through unchanged
//! - `add_field` (processor): sets `field` to `value` on every object record
//! - `trash` (target): discards records
//! - `log` (target): logs every record at debug level

use crate::stages::{
    parse_stage_config, Processor, Source, SourceBatch, StageDefinition, StageError,
    StageInstance, Target,
};
use pr_protocol::{Record, StageKind};
use serde::Deserialize;

pub(crate) fn definitions() -> Vec<StageDefinition> {
    vec![
        StageDefinition::new(
            "dev_sequence",
            StageKind::Source,
            "Generates an increasing sequence of records",
            |config| {
                let settings: DevSequenceConfig = parse_stage_config(config)?;
                Ok(StageInstance::Source(Box::new(DevSequence {
                    instance: config.instance_name.clone(),
                    limit: settings.limit,
                })))
            },
        ),
        StageDefinition::new(
            "identity",
            StageKind::Processor,
            "Passes records through unchanged",
            |config| {
                let _: EmptyConfig = parse_stage_config(config)?;
                Ok(StageInstance::Processor(Box::new(Identity)))
            },
        ),
        StageDefinition::new(
            "add_field",
            StageKind::Processor,
            "Sets a field to a constant value",
            |config| {
                let settings: AddFieldConfig = parse_stage_config(config)?;
                if settings.field.is_empty() {
                    return Err(StageError::InvalidConfig {
                        stage: config.instance_name.clone(),
                        reason: "field must not be empty".to_string(),
                    });
                }
                Ok(StageInstance::Processor(Box::new(AddField {
                    instance: config.instance_name.clone(),
                    field: settings.field,
                    value: settings.value,
                })))
            },
        ),
        StageDefinition::new("trash", StageKind::Target, "Discards records", |config| {
            let _: EmptyConfig = parse_stage_config(config)?;
            Ok(StageInstance::Target(Box::new(Trash { written: 0 })))
        }),
        StageDefinition::new("log", StageKind::Target, "Logs every record", |config| {
            let _: EmptyConfig = parse_stage_config(config)?;
            Ok(StageInstance::Target(Box::new(Log {
                instance: config.instance_name.clone(),
            })))
        }),
    ]
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptyConfig {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DevSequenceConfig {
    #[serde(default)]
    limit: Option<u64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AddFieldConfig {
    field: String,
    value: serde_json::Value,
}

struct DevSequence {
    instance: String,
    limit: Option<u64>,
}

impl Source for DevSequence {
    fn produce(
        &mut self,
        offset: Option<&str>,
        max_records: usize,
    ) -> Result<SourceBatch, StageError> {
        // The token is the next sequence number to emit.
        let start = match offset {
            None => 0,
            Some(token) => token.parse::<u64>().map_err(|_| {
                StageError::failed(&self.instance, format!("invalid offset '{token}'"))
            })?,
        };
        let mut end = start.saturating_add(max_records as u64);
        if let Some(limit) = self.limit {
            end = end.min(limit.max(start));
        }

        let records = (start..end)
            .map(|seq| {
                Record::new(
                    format!("{}::{seq}", self.instance),
                    serde_json::json!({ "seq": seq }),
                )
            })
            .collect();

        Ok(SourceBatch {
            records,
            offset: end.to_string(),
            exhausted: self.limit.is_some_and(|limit| end >= limit),
        })
    }
}

struct Identity;

impl Processor for Identity {
    fn process(&mut self, records: Vec<Record>) -> Result<Vec<Record>, StageError> {
        Ok(records)
    }
}

struct AddField {
    instance: String,
    field: String,
    value: serde_json::Value,
}

impl Processor for AddField {
    fn process(&mut self, mut records: Vec<Record>) -> Result<Vec<Record>, StageError> {
        for record in &mut records {
            let Some(fields) = record.value.as_object_mut() else {
                return Err(StageError::failed(
                    &self.instance,
                    format!("record '{}' is not an object", record.source_id),
                ));
            };
            fields.insert(self.field.clone(), self.value.clone());
        }
        Ok(records)
    }
}

struct Trash {
    written: u64,
}

impl Target for Trash {
    fn write(&mut self, records: &[Record]) -> Result<(), StageError> {
        self.written += records.len() as u64;
        tracing::trace!(records = records.len(), total = self.written, "Discarded batch");
        Ok(())
    }
}

struct Log {
    instance: String,
}

impl Target for Log {
    fn write(&mut self, records: &[Record]) -> Result<(), StageError> {
        for record in records {
            tracing::debug!(
                stage = %self.instance,
                source_id = %record.source_id,
                value = %record.value,
                "Record"
            );
        }
        Ok(())
    }
}
