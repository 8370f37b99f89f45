//! `realize(build)` (§4.5): compute fingerprint, check the cache, otherwise
//! stage, run the `create` program under a lock, validate outputs, and
//! promote staging into the store.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::info;

use crate::build::types::{BuildNode, BuildOutputs};
use crate::eval::{ActionStep, InputEdge};
use crate::fetch::SourceFetcher;
use crate::lock::{LockError, acquire_build_lock};
use crate::placeholder::Resolver;
use crate::sandbox::{ActionCtx, ExecSpec, SandboxError};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("build {id:?} failed: {source}")]
  Sandbox {
    id: Option<String>,
    #[source]
    source: SandboxError,
  },
  #[error("build {id:?} declared output {name:?} but it does not exist at {path}")]
  MissingOutput { id: Option<String>, name: String, path: String },
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Lock(#[from] LockError),
  #[error(transparent)]
  Fetch(#[from] crate::fetch::FetchError),
}

/// Realize a build. At-most-one in-flight realization per fingerprint is
/// guaranteed by the per-fingerprint build lock (§4.11); a second caller
/// that was waiting on the lock re-checks `.complete` immediately after
/// acquiring it and returns the already-built outputs without re-running
/// `create` (cache-monotonicity, §8 property 2).
pub async fn realize(store: &Store, node: &BuildNode, fetcher: &dyn SourceFetcher) -> Result<BuildOutputs, BuildError> {
  let fp = &node.fingerprint;

  if store.is_complete(fp) {
    info!(fp = %fp.short(), "build cache hit");
    return Ok(collect_outputs(store, node)?);
  }

  let _lock = acquire_build_lock(store.paths(), fp)?;

  if store.is_complete(fp) {
    info!(fp = %fp.short(), "build completed by another process while waiting for lock");
    return Ok(collect_outputs(store, node)?);
  }

  info!(fp = %fp.short(), id = ?node.spec.id, "realizing build");

  let staging = store.stage()?;
  let out_dir = staging.path().to_path_buf();
  let ctx = ActionCtx::new(out_dir.clone());

  let mut action_results = Vec::new();
  for step in &node.spec.create {
    let result = run_step(&ctx, step, &action_results, fetcher, &out_dir)
      .await
      .map_err(|source| BuildError::Sandbox {
        id: node.spec.id.clone(),
        source,
      })?;
    action_results.push(result);
  }

  validate_outputs(node, &out_dir)?;

  store.promote(fp, staging)?;
  info!(fp = %fp.short(), "build realized");

  collect_outputs(store, node)
}

async fn run_step(
  ctx: &ActionCtx,
  step: &ActionStep,
  prior: &[String],
  fetcher: &dyn SourceFetcher,
  out_dir: &std::path::Path,
) -> Result<String, SandboxError> {
  let resolver = Resolver {
    out: &ctx.out.to_string_lossy(),
    action_results: prior,
  };

  match step {
    ActionStep::Exec { bin, args, env, cwd } => {
      let resolved_args = args.iter().map(|a| resolver.resolve(a)).collect();
      let resolved_env: BTreeMap<_, _> = env.iter().map(|(k, v)| (k.clone(), resolver.resolve(v))).collect();
      ctx
        .exec(ExecSpec {
          bin: bin.clone(),
          args: resolved_args,
          env: resolved_env,
          cwd: cwd.as_deref().map(|c| resolver.resolve(c).into()),
          deadline: None,
        })
        .await
    }
    ActionStep::Script { kind, body, name } => ctx.script(*kind, &resolver.resolve(body), name.as_deref()).await,
    ActionStep::Fetch { edge } => {
      let content_hash = match edge {
        InputEdge::Remote { sha256, .. } => sha256.clone(),
        InputEdge::Git { commit, .. } => commit.clone(),
        _ => return Ok(String::new()),
      };
      let dest = out_dir.join(&content_hash);
      fetcher
        .fetch(edge, &dest)
        .map(|p| p.to_string_lossy().to_string())
        .map_err(|e| SandboxError::ExecFailed {
          bin: "fetch".into(),
          status: None,
          stderr_tail: e.to_string(),
        })
    }
  }
}

fn validate_outputs(node: &BuildNode, out_dir: &std::path::Path) -> Result<(), BuildError> {
  let Some(outputs) = &node.spec.outputs else {
    return Ok(());
  };
  for (name, rel) in outputs {
    let resolver = Resolver {
      out: &out_dir.to_string_lossy(),
      action_results: &[],
    };
    let path = resolver.resolve(rel);
    if !std::path::Path::new(&path).exists() {
      return Err(BuildError::MissingOutput {
        id: node.spec.id.clone(),
        name: name.clone(),
        path,
      });
    }
  }
  Ok(())
}

fn collect_outputs(store: &Store, node: &BuildNode) -> Result<BuildOutputs, StoreError> {
  let obj_dir = store.paths().obj_dir(&node.fingerprint);
  let mut map = BTreeMap::new();
  if let Some(outputs) = &node.spec.outputs {
    for (name, rel) in outputs {
      let resolver = Resolver {
        out: &obj_dir.to_string_lossy(),
        action_results: &[],
      };
      map.insert(name.clone(), std::path::PathBuf::from(resolver.resolve(rel)));
    }
  } else {
    map.insert("out".to_string(), obj_dir);
  }
  Ok(BuildOutputs(map))
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::eval::BuildSpec;
  use crate::fetch::LocalFetcher;

  fn echo_build(content: &str) -> BuildNode {
    BuildNode::new(BuildSpec {
      id: Some("echo-1.0.0".into()),
      inputs: BTreeMap::new(),
      create: vec![ActionStep::Exec {
        bin: "/bin/sh".into(),
        args: vec!["-c".into(), format!("printf '%s' '{content}' > ${{out}}/hello.txt")],
        env: BTreeMap::new(),
        cwd: None,
      }],
      outputs: Some(BTreeMap::from([("out".into(), "${out}/hello.txt".into())])),
    })
  }

  #[tokio::test]
  async fn realize_runs_once_and_produces_declared_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let node = echo_build("hello");

    let outputs = realize(&store, &node, &LocalFetcher).await.unwrap();
    let path = outputs.get("out").unwrap();
    assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    assert!(store.is_complete(&node.fingerprint));
  }

  #[tokio::test]
  async fn second_realize_is_a_cache_hit() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let node = echo_build("hello");

    realize(&store, &node, &LocalFetcher).await.unwrap();
    let marker_mtime_1 = std::fs::metadata(store.paths().complete_marker(&node.fingerprint)).unwrap().modified().unwrap();

    // Re-realizing must not rerun `create`; completion marker is untouched.
    realize(&store, &node, &LocalFetcher).await.unwrap();
    let marker_mtime_2 = std::fs::metadata(store.paths().complete_marker(&node.fingerprint)).unwrap().modified().unwrap();

    assert_eq!(marker_mtime_1, marker_mtime_2);
  }

  #[tokio::test]
  async fn missing_declared_output_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let node = BuildNode::new(BuildSpec {
      id: Some("broken".into()),
      inputs: BTreeMap::new(),
      create: vec![],
      outputs: Some(BTreeMap::from([("out".into(), "${out}/never-written.txt".into())])),
    });

    let err = realize(&store, &node, &LocalFetcher).await.unwrap_err();
    assert!(matches!(err, BuildError::MissingOutput { .. }));
    assert!(!store.is_complete(&node.fingerprint));
  }

  #[tokio::test]
  async fn failing_action_fails_the_build_and_leaves_no_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let node = BuildNode::new(BuildSpec {
      id: Some("failing-build".into()),
      inputs: BTreeMap::new(),
      create: vec![ActionStep::Exec {
        bin: "/bin/false".into(),
        args: vec![],
        env: BTreeMap::new(),
        cwd: None,
      }],
      outputs: None,
    });

    let err = realize(&store, &node, &LocalFetcher).await.unwrap_err();
    assert!(matches!(err, BuildError::Sandbox { .. }));
    assert!(!store.is_complete(&node.fingerprint));
  }
}
