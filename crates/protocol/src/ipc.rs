//! Notifications published by the controller.
//!
//! The controller never blocks callers on asynchronous outcomes. Instead it
//! publishes `Event`s that observers may subscribe to, in addition to the
//! pollable state and snapshot status.
//!
//! Uses tagged enum serialization for TypeScript compatibility:
//! ```json
//! {
//!   "type": "offsetCommitted",
//!   "payload": {
//!     "run_id": "uuid-here",
//!     "pipeline": "myPipeline",
//!     "offset": "42"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::state_models::PipelineState;

/// Events sent from the controller to its observers.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// The pipeline state was durably transitioned.
    StateChanged { state: PipelineState },

    /// The running pipeline committed a new source offset.
    OffsetCommitted {
        #[ts(type = "string")]
        run_id: Uuid,
        pipeline: String,
        offset: String,
    },

    /// A requested snapshot was captured and persisted.
    SnapshotCaptured {
        #[ts(type = "string")]
        run_id: Uuid,
        pipeline: String,
        records: usize,
    },

    /// The runner reported an unrecoverable error.
    RunFault {
        #[ts(type = "string")]
        run_id: Uuid,
        pipeline: String,
        error: String,
    },
}
