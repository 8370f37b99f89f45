//! Top-level apply/destroy orchestration (§2 "Flow of one apply", §5
//! concurrency model): ties the plan, build executor, bind driver, snapshot
//! store, and rollback coordinator together.
//!
//! Builds run up to [`crate::config::Config::workers`] in parallel; binds
//! execute strictly sequentially in plan order (§5).

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::bind::{self, BindError, BindNode, BindStateStore};
use crate::build::{self, BuildError};
use crate::config::Config;
use crate::eval::Registry;
use crate::fetch::SourceFetcher;
use crate::fingerprint::Fingerprint;
use crate::plan::{BindTransition, Plan, PlanError, PlannedAction};
use crate::rollback::{self, Progress, RollbackReport};
use crate::snapshot::{BindRecord, BuildRecord, Manifest, SnapshotError, SnapshotStore, now_unix};
use crate::store::Store;

#[derive(Debug, Error)]
pub enum ApplyError {
  #[error(transparent)]
  Plan(#[from] PlanError),
  #[error(transparent)]
  Build(#[from] BuildError),
  #[error(transparent)]
  Bind(#[from] BindError),
  #[error(transparent)]
  Snapshot(#[from] SnapshotError),
}

/// Outcome of one `apply` run. `rollback` is populated only when the apply
/// failed partway through and the coordinator was invoked.
#[derive(Debug)]
pub struct ApplyReport {
  pub snapshot_id: Option<Fingerprint>,
  pub error: Option<ApplyError>,
  pub rollback: Option<RollbackReport>,
}

impl ApplyReport {
  /// Exit-code shape from §7: `0` success, `1` apply failure with rollback
  /// attempted, `2` partial rollback.
  pub fn exit_code(&self) -> i32 {
    match (&self.error, &self.rollback) {
      (None, _) => 0,
      (Some(_), Some(r)) if !r.is_full_success() => 2,
      (Some(_), _) => 1,
    }
  }
}

/// Drive a full apply: plan, realize added builds, run bind actions in
/// order, and — on success — write and advance a new snapshot. On failure,
/// invoke the rollback coordinator and, if it could not fully restore the
/// prior snapshot, persist a manifest reflecting actual on-disk bind state
/// so later applies/diffs are never based on a stale assumption.
pub async fn apply(store: &Store, config: &Config, registry: Registry, fetcher: &dyn SourceFetcher, config_path: Option<String>) -> ApplyReport {
  let snapshots = SnapshotStore::new(store);
  let prior = match snapshots.current_manifest() {
    Ok(m) => m,
    Err(e) => {
      return ApplyReport {
        snapshot_id: None,
        error: Some(ApplyError::Snapshot(e)),
        rollback: None,
      };
    }
  };

  let plan = match Plan::build(registry, &prior) {
    Ok(p) => p,
    Err(e) => {
      return ApplyReport {
        snapshot_id: None,
        error: Some(ApplyError::Plan(e)),
        rollback: None,
      };
    }
  };

  let mut progress = Progress::default();

  if let Err(e) = realize_added_builds(store, &plan, config.workers, fetcher).await {
    return finish_with_failure(store, &snapshots, &plan, &prior, &progress, fetcher, ApplyError::Build(e)).await;
  }

  for action in &plan.actions {
    let outcome = match action {
      PlannedAction::RealizeBuild(_) => Ok(()),
      PlannedAction::DestroyBind(fp) => execute_destroy(store, &prior, *fp, fetcher, &mut progress).await.map_err(ApplyError::Bind),
      PlannedAction::CreateBind(fp) => execute_create(store, &plan, *fp, fetcher, &mut progress).await.map_err(ApplyError::Bind),
      PlannedAction::UpdateBind(fp) => execute_update(store, &plan, &prior, *fp, fetcher, &mut progress).await.map_err(ApplyError::Bind),
    };

    if let Err(e) = outcome {
      return finish_with_failure(store, &snapshots, &plan, &prior, &progress, fetcher, e).await;
    }
  }

  match write_final_snapshot(&snapshots, store, &plan, config_path) {
    Ok(id) => {
      stamp_bind_snapshot_ids(store, &plan, id);
      ApplyReport {
        snapshot_id: Some(id),
        error: None,
        rollback: None,
      }
    }
    Err(e) => ApplyReport {
      snapshot_id: None,
      error: Some(ApplyError::Snapshot(e)),
      rollback: None,
    },
  }
}

async fn realize_added_builds(store: &Store, plan: &Plan, workers: usize, fetcher: &dyn SourceFetcher) -> Result<(), BuildError> {
  let semaphore = Arc::new(Semaphore::new(workers.max(1)));
  let mut handles = Vec::new();

  for node in plan.builds.clone() {
    let permit = semaphore.clone();
    // `Store`/`SourceFetcher` are not `'static`-owned here; run on the
    // current task set so borrowed references stay valid, bounding
    // concurrency with the semaphore rather than `tokio::spawn`.
    handles.push(async move {
      let _permit = permit.acquire_owned().await.expect("semaphore not closed");
      build::realize(store, &node, fetcher).await
    });
  }

  let results = futures_join_all(handles).await;
  for result in results {
    result?;
  }
  Ok(())
}

/// Minimal stand-in for `futures::future::join_all` so the crate does not
/// need to add the `futures` dependency for a single call site; awaits each
/// future to completion without requiring `Send + 'static`.
async fn futures_join_all<F: std::future::Future>(futures: Vec<F>) -> Vec<F::Output> {
  let mut out = Vec::with_capacity(futures.len());
  for fut in futures {
    out.push(fut.await);
  }
  out
}

async fn execute_destroy(store: &Store, prior: &Manifest, fp: Fingerprint, fetcher: &dyn SourceFetcher, progress: &mut Progress) -> Result<(), BindError> {
  let Some(record) = prior.binds.get(&fp) else {
    warn!(fp = %fp.short(), "destroy action for a fingerprint absent from the prior manifest, skipping");
    return Ok(());
  };
  let node = BindNode {
    fingerprint: fp,
    spec: record.spec.clone(),
  };

  let states = BindStateStore::new(store);
  let outputs = states.load(&fp).ok().flatten().map(|s| s.outputs).unwrap_or_else(|| record.outputs.clone());

  let work_dir = tempfile::tempdir().expect("failed to allocate scratch dir");
  bind::destroy(&node, &outputs, work_dir.path(), fetcher).await?;
  let _ = states.delete(&fp);

  progress.disturbed.push((node, outputs));
  Ok(())
}

async fn execute_create(store: &Store, plan: &Plan, fp: Fingerprint, fetcher: &dyn SourceFetcher, progress: &mut Progress) -> Result<(), BindError> {
  let Some(node) = plan.binds.iter().find(|b| b.fingerprint == fp) else {
    return Ok(());
  };

  let work_dir = tempfile::tempdir().expect("failed to allocate scratch dir");
  let outputs = bind::create(node, work_dir.path(), fetcher).await?;

  // The snapshot this create belongs to isn't written yet — `stamp_bind_snapshot_ids`
  // corrects `snapshot_id` once `apply` knows the real id.
  let states = BindStateStore::new(store);
  let _ = states.save(&crate::bind::BindState {
    id: node.spec.id.clone(),
    fingerprint: node.fingerprint,
    outputs,
    snapshot_id: fp,
  });

  progress.created.push(node.clone());
  Ok(())
}

async fn execute_update(store: &Store, plan: &Plan, prior: &Manifest, fp: Fingerprint, fetcher: &dyn SourceFetcher, progress: &mut Progress) -> Result<(), BindError> {
  let Some(node) = plan.binds.iter().find(|b| b.fingerprint == fp) else {
    return Ok(());
  };

  let old_fp = plan
    .bind_diff
    .iter()
    .find(|e| e.fingerprint == fp)
    .and_then(|e| match &e.transition {
      BindTransition::Update { old_fingerprint } => Some(*old_fingerprint),
      _ => None,
    });

  let states = BindStateStore::new(store);
  let old_outputs = old_fp.and_then(|old| states.load(&old).ok().flatten()).map(|s| s.outputs).unwrap_or_default();

  let work_dir = tempfile::tempdir().expect("failed to allocate scratch dir");
  let new_outputs = bind::update(node, &old_outputs, work_dir.path(), fetcher).await?;

  // Same placeholder-then-stamp treatment as `execute_create` above.
  let _ = states.save(&crate::bind::BindState {
    id: node.spec.id.clone(),
    fingerprint: node.fingerprint,
    outputs: new_outputs,
    snapshot_id: fp,
  });
  if let Some(old) = old_fp {
    let _ = states.delete(&old);
  }

  // Record what to restore on rollback at the bind's *old* identity: its
  // original fingerprint and spec, as recorded in the prior manifest.
  if let Some(old) = old_fp
    && let Some(old_record) = prior.binds.get(&old)
  {
    progress.disturbed.push((
      BindNode {
        fingerprint: old,
        spec: old_record.spec.clone(),
      },
      old_outputs,
    ));
  }

  Ok(())
}

async fn finish_with_failure(store: &Store, snapshots: &SnapshotStore<'_>, plan: &Plan, prior: &Manifest, progress: &Progress, fetcher: &dyn SourceFetcher, error: ApplyError) -> ApplyReport {
  error!(error = %error, "apply failed, invoking rollback");

  let work_dir = tempfile::tempdir().expect("failed to allocate scratch dir");
  let report = rollback::rollback(progress, prior, work_dir.path(), fetcher).await;

  if !report.is_full_success() {
    warn!("rollback only partially succeeded, persisting observed bind state as a new snapshot");
    if let Ok(manifest) = truth_manifest(store, plan)
      && let Ok(id) = snapshots.write(&manifest, None, now_unix())
    {
      let _ = snapshots.set_current(&id);
      stamp_bind_snapshot_ids(store, plan, id);
    }
  }

  ApplyReport {
    snapshot_id: None,
    error: Some(error),
    rollback: Some(report),
  }
}

/// Build the manifest that should become `current` once every planned
/// action has succeeded: the full target build/bind set from the plan
/// (§4.4's builds/binds vectors already represent the whole declaration,
/// not merely the diff), with bind outputs read back from persisted state.
fn write_final_snapshot(snapshots: &SnapshotStore, store: &Store, plan: &Plan, config_path: Option<String>) -> Result<Fingerprint, SnapshotError> {
  let manifest = truth_manifest(store, plan)?;
  let id = snapshots.write(&manifest, config_path, now_unix())?;
  snapshots.set_current(&id)?;
  info!(id = %id.short(), "apply complete");
  Ok(id)
}

/// Fix up `BindState::snapshot_id` for every bind this apply created or
/// updated, now that the real id exists (§3: it must name "the snapshot id
/// that last advanced it", which isn't known until the snapshot is written).
fn stamp_bind_snapshot_ids(store: &Store, plan: &Plan, snapshot_id: Fingerprint) {
  let states = BindStateStore::new(store);
  for action in &plan.actions {
    let fp = match action {
      PlannedAction::CreateBind(fp) | PlannedAction::UpdateBind(fp) => *fp,
      _ => continue,
    };
    if let Ok(Some(mut state)) = states.load(&fp) {
      state.snapshot_id = snapshot_id;
      let _ = states.save(&state);
    }
  }
}

/// A manifest built from what the store actually holds right now, rather
/// than from assumed success — every declared build that is complete, every
/// declared bind whose state file exists.
fn truth_manifest(store: &Store, plan: &Plan) -> Result<Manifest, SnapshotError> {
  let mut manifest = Manifest::default();
  let states = BindStateStore::new(store);

  for node in &plan.builds {
    if store.is_complete(&node.fingerprint) {
      manifest.builds.insert(
        node.fingerprint,
        BuildRecord {
          spec: node.spec.clone(),
        },
      );
    }
  }

  for node in &plan.binds {
    if let Ok(Some(state)) = states.load(&node.fingerprint) {
      manifest.binds.insert(
        node.fingerprint,
        BindRecord {
          spec: node.spec.clone(),
          outputs: state.outputs,
        },
      );
    }
  }

  Ok(manifest)
}

/// Top-level destroy: tear down every bind in the current snapshot, in
/// reverse topological order, then clear the current pointer. Builds are
/// left in the store for GC to reclaim later.
pub async fn destroy(store: &Store, fetcher: &dyn SourceFetcher) -> Result<(), ApplyError> {
  let snapshots = SnapshotStore::new(store);
  let manifest = snapshots.current_manifest()?;

  let mut fps: Vec<_> = manifest.binds.keys().copied().collect();
  fps.reverse();

  let states = BindStateStore::new(store);
  for fp in fps {
    let Some(record) = manifest.binds.get(&fp) else { continue };
    let node = BindNode {
      fingerprint: fp,
      spec: record.spec.clone(),
    };
    let outputs = states.load(&fp).ok().flatten().map(|s| s.outputs).unwrap_or_else(|| record.outputs.clone());
    let work_dir = tempfile::tempdir().expect("failed to allocate scratch dir");
    bind::destroy(&node, &outputs, work_dir.path(), fetcher).await?;
    let _ = states.delete(&fp);
  }

  let _ = snapshots.clear_current();
  Ok(())
}
