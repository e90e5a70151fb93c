//! Records moving through a pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A single record produced by a source stage.
///
/// The payload is schemaless; stages agree on its shape among themselves.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Identifier assigned by the source, e.g. `<instance>::<position>`.
    pub source_id: String,

    /// Record payload.
    pub value: serde_json::Value,
}

impl Record {
    pub fn new(source_id: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            source_id: source_id.into(),
            value,
        }
    }
}

/// A captured sample of records, as persisted in the snapshot slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Pipeline the records were captured from.
    pub pipeline: String,

    /// When the capture completed.
    pub captured_at: DateTime<Utc>,

    /// Intercepted records, in pipeline order.
    pub records: Vec<Record>,
}
