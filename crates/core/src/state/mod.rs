//! Pipeline state management.
//!
//! This module provides:
//! - The lifecycle state machine (legal transitions and restart reconciliation)
//! - StateTracker, the sole owner of the durable pipeline state record

pub mod machine;
pub mod tracker;

pub use tracker::StateTracker;
