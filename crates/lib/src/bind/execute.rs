//! Bind lifecycle phases (§4.6): `create`/`update`/`destroy`/`check`.
//!
//! Each phase runs its [`crate::eval::ActionProgram`] under a process-private
//! temp dir `ActionCtx`. `check` never mutates state and is never called by
//! `apply` — only by `status`/`diff` tooling (Open Question, resolved: kept
//! read-only per source behavior).

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::info;

use crate::bind::types::BindNode;
use crate::eval::ActionStep;
use crate::fetch::SourceFetcher;
use crate::placeholder::Resolver;
use crate::sandbox::{ActionCtx, ExecSpec, SandboxError};

#[derive(Debug, Error)]
pub enum BindError {
  #[error("bind {id} create failed: {source}")]
  CreateFailed { id: String, #[source] source: SandboxError },
  #[error("bind {id} update failed: {source}")]
  UpdateFailed { id: String, #[source] source: SandboxError },
  #[error("bind {id} destroy failed: {source}")]
  DestroyFailed { id: String, #[source] source: SandboxError },
  #[error("bind {id} check failed: {source}")]
  CheckFailed { id: String, #[source] source: SandboxError },
  #[error("bind {id} has no update program but was asked to update in place")]
  NoUpdateProgram { id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
  pub drifted: bool,
  pub message: Option<String>,
}

async fn run_program(
  program: &[ActionStep],
  work_dir: &std::path::Path,
  seed_outputs: &BTreeMap<String, String>,
  fetcher: &dyn SourceFetcher,
) -> Result<BTreeMap<String, String>, SandboxError> {
  let ctx = ActionCtx::new(work_dir.to_path_buf());
  let mut action_results: Vec<String> = Vec::new();

  for step in program {
    let resolver = Resolver {
      out: &ctx.out.to_string_lossy(),
      action_results: &action_results,
    };

    let result = match step {
      ActionStep::Exec { bin, args, env, cwd } => {
        let args = args.iter().map(|a| resolver.resolve(a)).collect();
        let env: BTreeMap<_, _> = env
          .iter()
          .map(|(k, v)| (k.clone(), resolver.resolve(v)))
          .chain(seed_outputs.iter().map(|(k, v)| (k.clone(), v.clone())))
          .collect();
        ctx
          .exec(ExecSpec {
            bin: bin.clone(),
            args,
            env,
            cwd: cwd.as_deref().map(|c| resolver.resolve(c).into()),
            deadline: None,
          })
          .await?
      }
      ActionStep::Script { kind, body, name } => ctx.script(*kind, &resolver.resolve(body), name.as_deref()).await?,
      ActionStep::Fetch { edge } => {
        let dest = work_dir.join("fetched");
        fetcher.fetch(edge, &dest).map(|p| p.to_string_lossy().to_string()).map_err(|e| {
          SandboxError::ExecFailed {
            bin: "fetch".into(),
            status: None,
            stderr_tail: e.to_string(),
          }
        })?
      }
    };
    action_results.push(result);
  }

  // A program's "outputs" are its last step's stdout under a conventional
  // `result` key, plus anything seeded from prior phase outputs (update
  // carries the old outputs forward as env so the new program can diff
  // against them if it chooses to).
  let mut outputs = seed_outputs.clone();
  if let Some(last) = action_results.last() {
    outputs.insert("result".to_string(), last.clone());
  }
  Ok(outputs)
}

/// `create(inputs, ctx) -> outputs`. Caller persists the returned outputs
/// into bind state only after this returns `Ok` (§4.6: "If the thunk
/// throws, the bind is considered Absent").
pub async fn create(node: &BindNode, work_dir: &std::path::Path, fetcher: &dyn SourceFetcher) -> Result<BTreeMap<String, String>, BindError> {
  info!(id = %node.spec.id, fp = %node.fingerprint.short(), "creating bind");
  run_program(&node.spec.create, work_dir, &BTreeMap::new(), fetcher)
    .await
    .map_err(|source| BindError::CreateFailed {
      id: node.spec.id.clone(),
      source,
    })
}

/// `update(old_outputs, new_inputs, ctx) -> new_outputs`. Only called when
/// `update` is declared; a fingerprint change without one is realized as
/// `destroy` + `create` by the planner instead (§4.4).
pub async fn update(
  node: &BindNode,
  old_outputs: &BTreeMap<String, String>,
  work_dir: &std::path::Path,
  fetcher: &dyn SourceFetcher,
) -> Result<BTreeMap<String, String>, BindError> {
  let Some(program) = &node.spec.update else {
    return Err(BindError::NoUpdateProgram { id: node.spec.id.clone() });
  };

  info!(id = %node.spec.id, fp = %node.fingerprint.short(), "updating bind");
  run_program(program, work_dir, old_outputs, fetcher)
    .await
    .map_err(|source| BindError::UpdateFailed {
      id: node.spec.id.clone(),
      source,
    })
}

/// `destroy(outputs, ctx)`. Idempotent: the caller is responsible for
/// skipping this entirely when the bind is already Absent (no state file),
/// so re-driving destroy twice never runs the program a second time in
/// practice — but the program itself must also tolerate missing targets.
pub async fn destroy(node: &BindNode, outputs: &BTreeMap<String, String>, work_dir: &std::path::Path, fetcher: &dyn SourceFetcher) -> Result<(), BindError> {
  let Some(program) = &node.spec.destroy else {
    return Ok(());
  };

  info!(id = %node.spec.id, fp = %node.fingerprint.short(), "destroying bind");
  run_program(program, work_dir, outputs, fetcher)
    .await
    .map(|_| ())
    .map_err(|source| BindError::DestroyFailed {
      id: node.spec.id.clone(),
      source,
    })
}

/// `check(outputs, inputs, ctx) -> {drifted, message?}`. Read-only; never
/// invoked by `apply`, only by `status`/`diff` (§4.6, §9 Open Question).
pub async fn check(node: &BindNode, outputs: &BTreeMap<String, String>, work_dir: &std::path::Path, fetcher: &dyn SourceFetcher) -> Result<DriftReport, BindError> {
  let Some(program) = &node.spec.check else {
    return Ok(DriftReport {
      drifted: false,
      message: None,
    });
  };

  let result = run_program(program, work_dir, outputs, fetcher).await.map_err(|source| BindError::CheckFailed {
    id: node.spec.id.clone(),
    source,
  })?;

  let message = result.get("result").cloned();
  let drifted = message.as_deref().is_some_and(|m| !m.is_empty());
  Ok(DriftReport { drifted, message })
}
