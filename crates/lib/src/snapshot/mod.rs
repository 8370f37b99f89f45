//! Snapshot Store (C7).

mod storage;
mod types;

pub use storage::{SnapshotError, SnapshotStore, now_unix};
pub use types::{BindRecord, BuildRecord, Manifest, SnapshotMeta};
