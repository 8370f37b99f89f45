//! The CLI's own declaration format.
//!
//! The evaluation bridge (`warden_core::eval`) deliberately does not embed a
//! script interpreter (§9, "Action thunks as values") — an external
//! evaluator drives a [`Registry`] and hands it to the core. For this CLI
//! that evaluator is a plain JSON document that deserializes directly into
//! [`BuildSpec`]/[`BindSpec`] registrations, with cross-references between
//! entries resolved by name as the file is read top to bottom (mirroring
//! the registry's own "a handle is usable as an input edge in later calls"
//! ordering rule).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use warden_core::eval::{ActionProgram, BindSpec, BuildSpec, InputEdge, Literal, Registry};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DeclarationFile {
  #[serde(default)]
  pub builds: Vec<DeclaredBuild>,
  #[serde(default)]
  pub binds: Vec<DeclaredBind>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeclaredBuild {
  /// Local name other entries use to reference this build; not persisted.
  pub name: String,
  pub id: Option<String>,
  #[serde(default)]
  pub inputs: BTreeMap<String, DeclaredInput>,
  pub create: ActionProgram,
  #[serde(default)]
  pub outputs: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeclaredBind {
  pub name: String,
  pub id: String,
  #[serde(default)]
  pub inputs: BTreeMap<String, DeclaredInput>,
  pub create: ActionProgram,
  #[serde(default)]
  pub update: Option<ActionProgram>,
  #[serde(default)]
  pub destroy: Option<ActionProgram>,
  #[serde(default)]
  pub check: Option<ActionProgram>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclaredInput {
  Literal { value: Literal },
  /// A path to a local file; its content digest is computed at load time.
  Path { path: String },
  BuildRef { name: String },
  BindRef { name: String },
  Remote { url: String, sha256: String, format: String },
  Git { url: String, commit: String },
}

/// Load a declaration file and build a [`Registry`] from it, resolving
/// `BuildRef`/`BindRef` entries by name against nodes registered earlier in
/// the file. Entries must appear in dependency order — the same constraint
/// the registry itself imposes on a live evaluator.
pub fn load_registry(path: &Path) -> Result<Registry> {
  let bytes = std::fs::read(path).with_context(|| format!("failed to read declaration file {}", path.display()))?;
  let decl: DeclarationFile =
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse declaration file {}", path.display()))?;

  let mut registry = Registry::new();
  let mut build_refs: BTreeMap<String, warden_core::eval::BuildRef> = BTreeMap::new();
  let mut bind_refs: BTreeMap<String, warden_core::eval::BindRef> = BTreeMap::new();

  for build in decl.builds {
    let inputs = resolve_inputs(build.inputs, &build_refs, &bind_refs)
      .with_context(|| format!("build '{}'", build.name))?;
    let handle = registry.register_build(BuildSpec {
      id: build.id,
      inputs,
      create: build.create,
      outputs: build.outputs,
    });
    build_refs.insert(build.name, handle);
  }

  for bind in decl.binds {
    let inputs = resolve_inputs(bind.inputs, &build_refs, &bind_refs)
      .with_context(|| format!("bind '{}'", bind.name))?;
    let handle = registry.register_bind(BindSpec {
      id: bind.id,
      inputs,
      create: bind.create,
      update: bind.update,
      destroy: bind.destroy,
      check: bind.check,
    });
    bind_refs.insert(bind.name, handle);
  }

  Ok(registry)
}

fn resolve_inputs(
  declared: BTreeMap<String, DeclaredInput>,
  build_refs: &BTreeMap<String, warden_core::eval::BuildRef>,
  bind_refs: &BTreeMap<String, warden_core::eval::BindRef>,
) -> Result<BTreeMap<String, InputEdge>> {
  declared
    .into_iter()
    .map(|(name, input)| {
      let edge = match input {
        DeclaredInput::Literal { value } => InputEdge::Literal(value),
        DeclaredInput::Path { path } => {
          let bytes = std::fs::read(&path).with_context(|| format!("failed to read input path {path}"))?;
          InputEdge::Path {
            digest: warden_core::util::hash::digest_bytes(&bytes),
          }
        }
        DeclaredInput::BuildRef { name: target } => {
          let Some(build_ref) = build_refs.get(&target) else {
            bail!("input '{name}' references unknown build '{target}' (declare it earlier in the file)");
          };
          InputEdge::Build(build_ref.clone())
        }
        DeclaredInput::BindRef { name: target } => {
          let Some(bind_ref) = bind_refs.get(&target) else {
            bail!("input '{name}' references unknown bind '{target}' (declare it earlier in the file)");
          };
          InputEdge::Bind(bind_ref.clone())
        }
        DeclaredInput::Remote { url, sha256, format } => InputEdge::Remote { url, sha256, format },
        DeclaredInput::Git { url, commit } => InputEdge::Git { url, commit },
      };
      Ok((name, edge))
    })
    .collect()
}
