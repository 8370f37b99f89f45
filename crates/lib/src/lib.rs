//! `warden-core`: the reconciliation engine between script evaluation and
//! the host.
//!
//! A user's script registers **builds** (pure, content-addressed artifacts
//! produced by sandboxed actions) and **binds** (stateful host effects —
//! symlinks, services, files) through [`eval::Registry`]. This crate
//! fingerprints, plans, realizes, and reconciles that declaration against
//! the host, recording every applied state as a snapshot so later applies
//! can diff, roll back, or garbage-collect.
//!
//! The script interpreter itself, HTTP/Git fetchers, and the CLI frontend
//! are out of scope — see [`eval`] and [`fetch::SourceFetcher`] for the
//! capability boundaries this crate exposes instead of embedding them.

pub mod apply;
pub mod bind;
pub mod build;
pub mod config;
pub mod eval;
pub mod fetch;
pub mod fingerprint;
pub mod gc;
pub mod lock;
pub mod placeholder;
pub mod plan;
pub mod platform;
pub mod rollback;
pub mod sandbox;
pub mod snapshot;
pub mod store;
pub mod util;

pub use apply::{ApplyError, ApplyReport};
pub use config::Config;
pub use eval::Registry;
pub use fingerprint::Fingerprint;
pub use store::Store;

/// Aggregate error type spanning every module, carrying a stable `kind()`
/// used by the CLI to pick an exit code and render the JSON error report
/// shape (§7), mirroring the way the teacher's CLI layer composes module
/// errors via `anyhow::Context` rather than a hand-rolled enum per command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error(transparent)]
  Plan(#[from] plan::PlanError),
  #[error(transparent)]
  Build(#[from] build::BuildError),
  #[error(transparent)]
  Bind(#[from] bind::BindError),
  #[error(transparent)]
  Snapshot(#[from] snapshot::SnapshotError),
  #[error(transparent)]
  Rollback(#[from] rollback::RollbackError),
  #[error(transparent)]
  Sandbox(#[from] sandbox::SandboxError),
  #[error(transparent)]
  Gc(#[from] gc::GcError),
  #[error(transparent)]
  Lock(#[from] lock::LockError),
  #[error(transparent)]
  Apply(#[from] apply::ApplyError),
}

impl Error {
  /// The wire-level error kind name from §7, used by the CLI to choose an
  /// exit code and to key the JSON report without the caller needing to
  /// match on the full enum.
  pub fn kind(&self) -> &'static str {
    match self {
      Error::Plan(plan::PlanError::Graph(plan::GraphError::Cycle(_))) => "cycle",
      Error::Plan(plan::PlanError::DuplicateBindId(_)) => "unresolved_input",
      Error::Build(build::BuildError::MissingOutput { .. }) => "build_failed",
      Error::Build(build::BuildError::Sandbox { .. }) => "build_failed",
      Error::Build(build::BuildError::Fetch(_)) => "fingerprint_mismatch",
      Error::Build(build::BuildError::Lock(_)) => "lock_contention",
      Error::Build(build::BuildError::Store(_)) => "store_corruption",
      Error::Bind(bind::BindError::CreateFailed { .. }) => "bind_create_failed",
      Error::Bind(bind::BindError::UpdateFailed { .. }) => "bind_update_failed",
      Error::Bind(bind::BindError::DestroyFailed { .. }) => "bind_destroy_failed",
      Error::Bind(bind::BindError::CheckFailed { .. }) => "bind_update_failed",
      Error::Bind(bind::BindError::NoUpdateProgram { .. }) => "bind_update_failed",
      Error::Snapshot(snapshot::SnapshotError::NotFound(_)) => "snapshot_not_found",
      Error::Snapshot(snapshot::SnapshotError::CannotDeleteCurrent) => "cannot_delete_current",
      Error::Snapshot(snapshot::SnapshotError::Lock(_)) => "lock_contention",
      Error::Snapshot(_) => "store_corruption",
      Error::Rollback(_) => "bind_destroy_failed",
      Error::Sandbox(sandbox::SandboxError::ExecTimeout(_)) => "exec_timeout",
      Error::Sandbox(_) => "exec_failed",
      Error::Gc(gc::GcError::Busy(_)) => "gc_busy",
      Error::Gc(_) => "store_corruption",
      Error::Lock(_) => "lock_contention",
      Error::Apply(_) => "build_failed",
    }
  }
}
