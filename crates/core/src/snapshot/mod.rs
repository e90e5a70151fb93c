//! Snapshot capture.
//!
//! A snapshot is a one-shot sample of records intercepted from a live run.
//! Each pipeline has a single slot: a capture fills it, and it stays until
//! explicitly deleted.

pub mod coordinator;
pub mod store;

pub use coordinator::SnapshotCoordinator;
pub use store::SnapshotStore;

use pr_protocol::Snapshot;
use std::io::Read;

/// Decode a snapshot byte stream returned by
/// [`SnapshotCoordinator::get_snapshot`].
pub fn decode_snapshot<R: Read>(reader: R) -> serde_json::Result<Snapshot> {
    serde_json::from_reader(reader)
}
