//! The evaluation bridge (C3).
//!
//! The script interpreter that produces a declaration is out of scope for
//! this crate — we specify only the value shape it must build. An external
//! evaluator (embedded Lua, a config DSL, or in tests a plain Rust closure)
//! drives a [`Registry`], calling [`Registry::register_build`] and
//! [`Registry::register_bind`] in dependency order. Each call returns an
//! opaque ref usable as an [`InputEdge`] in later calls, so edges exist
//! before any node executes.
//!
//! Lifecycle phases are captured as [`ActionProgram`]s — flat sequences of
//! capability calls — rather than live closures. This is the "tagged
//! descriptor" redesign: because programs are plain data, [`crate::fingerprint`]
//! can hash them directly and the evaluator process need not stay alive
//! during `apply`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::util::hash::Digest32;

/// A literal scalar or mapping value usable inside [`InputEdge::Literal`].
///
/// Mirrors the shape a script-language table/value would deserialize into;
/// keys are a `BTreeMap` so serialization (and thus hashing) is order-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
  String(String),
  Number(f64),
  Bool(bool),
  Table(BTreeMap<String, Literal>),
  Array(Vec<Literal>),
}

/// One input edge of a build or bind, as defined in §3 of the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEdge {
  /// A literal scalar or mapping, hashed by its canonical form.
  Literal(Literal),
  /// A reference to file contents, identified by a digest of those contents.
  Path { digest: Digest32 },
  /// A reference to an upstream build, identified by its fingerprint.
  Build(BuildRef),
  /// A reference to an upstream bind, identified by its fingerprint.
  Bind(BindRef),
  /// A remote source, named by URL and a declared content hash.
  Remote { url: String, sha256: String, format: String },
  /// A git source, named by repo URL and a resolved commit.
  Git { url: String, commit: String },
}

/// An opaque handle to a registered build, usable as an [`InputEdge::Build`]
/// in subsequent registrations. Carries the build's fingerprint once the
/// evaluator has finished registering it (builds register synchronously, so
/// this is always populated by the time the handle is returned).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildRef(pub Digest32);

/// An opaque handle to a registered bind. See [`BuildRef`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BindRef(pub Digest32);

/// One step of an [`ActionProgram`]. Steps are interpreted against an
/// `ActionCtx` (see [`crate::sandbox`]) at execution time, never at
/// registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionStep {
  /// Spawn a process directly, no implicit shell.
  Exec {
    bin: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<String>,
  },
  /// Write `body` to a temp file and invoke the interpreter for `kind`.
  Script {
    kind: ScriptKind,
    body: String,
    name: Option<String>,
  },
  /// Materialize a source object, verifying its declared content hash.
  Fetch { edge: InputEdge },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
  Shell,
  Cmd,
  Bash,
}

/// A flat sequence of capability calls recorded for one lifecycle phase.
pub type ActionProgram = Vec<ActionStep>;

/// The registration payload for a build node (§3, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
  pub id: Option<String>,
  pub inputs: BTreeMap<String, InputEdge>,
  pub create: ActionProgram,
  pub outputs: Option<BTreeMap<String, String>>,
}

/// The registration payload for a bind node (§3, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindSpec {
  pub id: String,
  pub inputs: BTreeMap<String, InputEdge>,
  pub create: ActionProgram,
  pub update: Option<ActionProgram>,
  pub destroy: Option<ActionProgram>,
  pub check: Option<ActionProgram>,
}

/// Read-only host facts exposed to the evaluator, threaded explicitly rather
/// than read from a module-level global (Design Notes §9, "Global `sys`
/// capability").
#[derive(Debug, Clone)]
pub struct HostFacts {
  pub os: &'static str,
  pub arch: &'static str,
  pub is_elevated: bool,
}

impl HostFacts {
  pub fn detect() -> Self {
    Self {
      os: std::env::consts::OS,
      arch: std::env::consts::ARCH,
      is_elevated: crate::platform::is_elevated(),
    }
  }
}

/// Explicit environment lookup capability. The core never forwards host env
/// to sandboxed children; this is how the evaluator (not the sandbox) may
/// consult it when building a declaration.
pub trait EnvLookup {
  fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
  fn get(&self, key: &str) -> Option<String> {
    std::env::var(key).ok()
  }
}

/// The un-fingerprinted node as recorded by the registry, before §4.1
/// fingerprinting assigns it an identity.
#[derive(Debug, Clone)]
pub enum RegisteredNode {
  Build(BuildSpec),
  Bind(BindSpec),
}

/// Accumulates build/bind registrations in call order and assigns
/// fingerprints eagerly, so a handle returned from `register_build` is
/// immediately usable as an input edge.
///
/// This is the whole of the evaluation bridge's surface: an external
/// evaluator holds a `&mut Registry` and drives it to completion, then hands
/// the result to [`crate::plan::Plan::build`].
#[derive(Debug, Default)]
pub struct Registry {
  nodes: Vec<(Digest32, RegisteredNode)>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register_build(&mut self, spec: BuildSpec) -> BuildRef {
    let fp = crate::fingerprint::fingerprint_build(&spec);
    self.nodes.push((fp, RegisteredNode::Build(spec)));
    BuildRef(fp)
  }

  pub fn register_bind(&mut self, spec: BindSpec) -> BindRef {
    let fp = crate::fingerprint::fingerprint_bind(&spec);
    self.nodes.push((fp, RegisteredNode::Bind(spec)));
    BindRef(fp)
  }

  /// Consume the registry in registration order. [`crate::plan`] re-derives
  /// graph order from input edges; this order is only used to detect
  /// duplicate bind ids at build time.
  pub fn into_nodes(self) -> Vec<(Digest32, RegisteredNode)> {
    self.nodes
  }
}
