//! Rollback Coordinator (C8): on an apply failure, drives the inverse of
//! whatever the failed apply already committed, restoring the last good
//! snapshot on a best-effort basis (§4.8).

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::bind::{self, BindError, BindNode};
use crate::fetch::SourceFetcher;
use crate::fingerprint::Fingerprint;
use crate::snapshot::Manifest;

#[derive(Debug, Error)]
pub enum RollbackError {
  #[error("rollback step for bind {id} failed: {source}")]
  StepFailed { id: String, #[source] source: BindError },
}

/// One inverse action taken to undo part of a failed apply.
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackStep {
  /// A bind the failed apply created; undo by destroying it.
  UndoCreate { fingerprint: Fingerprint, id: String },
  /// A bind the failed apply destroyed or updated; undo by recreating it
  /// from the prior snapshot's recorded spec/outputs.
  Restore { fingerprint: Fingerprint, id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
  pub step: RollbackStep,
  pub ok: bool,
  pub message: Option<String>,
}

/// Outcome of a rollback run (§4.8: "advance or leave the current pointer
/// depending on full vs. partial success").
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackReport {
  pub outcomes: Vec<StepOutcome>,
}

impl RollbackReport {
  pub fn is_full_success(&self) -> bool {
    self.outcomes.iter().all(|o| o.ok)
  }

  pub fn failures(&self) -> Vec<&StepOutcome> {
    self.outcomes.iter().filter(|o| !o.ok).collect()
  }
}

/// What the in-progress apply had already done to the store before it
/// failed, as far as the coordinator needs to know to invert it. The caller
/// (the top-level `apply` orchestration) tracks this as it drives each
/// action, so rollback never has to rediscover it from store state.
#[derive(Debug, Clone, Default)]
pub struct Progress {
  /// Binds successfully created by this apply, in the order they were
  /// created (undone in reverse).
  pub created: Vec<BindNode>,
  /// Binds successfully destroyed or updated by this apply, paired with
  /// their prior-snapshot spec/outputs so they can be restored.
  pub disturbed: Vec<(BindNode, BTreeMap<String, String>)>,
}

/// Drive the inverse of `progress` against `work_dir`, reporting every step
/// taken. Never stops early on a failed step — failures accumulate into the
/// report so the caller can decide whether the pointer advances (§4.8).
pub async fn rollback(progress: &Progress, prior: &Manifest, work_dir: &std::path::Path, fetcher: &dyn SourceFetcher) -> RollbackReport {
  let mut outcomes = Vec::new();

  // Undo creates first, in reverse creation order, mirroring a destroy pass
  // of the freshly created binds.
  for node in progress.created.iter().rev() {
    let step = RollbackStep::UndoCreate {
      fingerprint: node.fingerprint,
      id: node.spec.id.clone(),
    };
    info!(id = %node.spec.id, "rollback: undoing create");
    match bind::destroy(node, &BTreeMap::new(), work_dir, fetcher).await {
      Ok(()) => outcomes.push(StepOutcome { step, ok: true, message: None }),
      Err(source) => {
        error!(id = %node.spec.id, error = %source, "rollback: undo-create failed");
        outcomes.push(StepOutcome {
          step,
          ok: false,
          message: Some(source.to_string()),
        });
      }
    }
  }

  // Restore disturbed binds, in reverse order of disturbance.
  for (node, _outputs) in progress.disturbed.iter().rev() {
    let step = RollbackStep::Restore {
      fingerprint: node.fingerprint,
      id: node.spec.id.clone(),
    };
    let prior_record = prior.bind_by_id(&node.spec.id);
    info!(id = %node.spec.id, "rollback: restoring prior state");

    let result = match prior_record {
      Some((_, record)) => bind::create(&BindNode { fingerprint: node.fingerprint, spec: record.spec.clone() }, work_dir, fetcher).await.map(|_| ()),
      None => {
        warn!(id = %node.spec.id, "rollback: no prior record to restore, destroying instead");
        bind::destroy(node, &BTreeMap::new(), work_dir, fetcher).await
      }
    };

    match result {
      Ok(()) => outcomes.push(StepOutcome { step, ok: true, message: None }),
      Err(source) => {
        error!(id = %node.spec.id, error = %source, "rollback: restore failed");
        outcomes.push(StepOutcome {
          step,
          ok: false,
          message: Some(source.to_string()),
        });
      }
    }
  }

  RollbackReport { outcomes }
}
