//! CLI command implementations.
//!
//! Each submodule implements a single CLI verb from the external interface
//! (§6): [`apply`], [`destroy`], [`status`], [`diff`], [`rollback`],
//! [`snapshot`], [`gc`].

mod apply;
mod destroy;
mod diff;
mod gc;
mod rollback;
mod snapshot;
mod status;

pub use apply::cmd_apply;
pub use destroy::cmd_destroy;
pub use diff::cmd_diff;
pub use gc::cmd_gc;
pub use rollback::cmd_rollback;
pub use snapshot::{SnapshotCommand, cmd_snapshot};
pub use status::cmd_status;
