//! Plan / Graph (C4): assign fingerprints, detect cycles, topologically sort,
//! diff against the current manifest, and emit an ordered action list
//! (§4.4).

mod graph;

pub use graph::{DependencyGraph, GraphError, NodeKind};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::bind::BindNode;
use crate::build::BuildNode;
use crate::eval::{BindSpec, BuildSpec, Registry, RegisteredNode};
use crate::fingerprint::Fingerprint;
use crate::snapshot::Manifest;

#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Graph(#[from] GraphError),
  #[error("duplicate bind id {0:?} registered twice in the same declaration")]
  DuplicateBindId(String),
}

/// Whether a bind's fingerprint changed and, if so, how the planner wants it
/// reconciled (§4.4 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTransition {
  Added,
  Removed { old_fingerprint: Fingerprint },
  /// Same id, new fingerprint, `update` declared on the new spec.
  Update { old_fingerprint: Fingerprint },
  /// Same id, new fingerprint, no `update` declared: destroy then create.
  Replace { old_fingerprint: Fingerprint },
  Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTransition {
  Added,
  Removed,
  Unchanged,
}

/// One diffed build, keyed by its (new, if present) fingerprint.
#[derive(Debug, Clone)]
pub struct BuildDiffEntry {
  pub fingerprint: Fingerprint,
  pub transition: BuildTransition,
}

#[derive(Debug, Clone)]
pub struct BindDiffEntry {
  pub fingerprint: Fingerprint,
  pub id: String,
  pub transition: BindTransition,
}

/// §4.4 step 5: the ordered action list derived from the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
  RealizeBuild(Fingerprint),
  DestroyBind(Fingerprint),
  CreateBind(Fingerprint),
  UpdateBind(Fingerprint),
}

pub struct Plan {
  pub builds: Vec<BuildNode>,
  pub binds: Vec<BindNode>,
  pub build_diff: Vec<BuildDiffEntry>,
  pub bind_diff: Vec<BindDiffEntry>,
  pub actions: Vec<PlannedAction>,
  graph: DependencyGraph,
}

impl Plan {
  /// Build a plan from a finished [`Registry`] and the manifest it should be
  /// diffed against (the current snapshot's manifest, or
  /// [`Manifest::default`] for a from-scratch apply).
  pub fn build(registry: Registry, prior: &Manifest) -> Result<Self, PlanError> {
    let nodes = registry.into_nodes();

    let mut build_specs: Vec<(Fingerprint, BuildSpec)> = Vec::new();
    let mut bind_specs: Vec<(Fingerprint, BindSpec)> = Vec::new();

    for (fp, node) in nodes {
      match node {
        RegisteredNode::Build(spec) => build_specs.push((fp, spec)),
        RegisteredNode::Bind(spec) => bind_specs.push((fp, spec)),
      }
    }

    // Deterministic tie-break: `(kind, id)` lex order among same-depth peers
    // (§4.4 step 3). Builds are sorted by id; binds by id; cross-kind order
    // is then resolved by the dependency graph itself.
    build_specs.sort_by(|a, b| a.1.id.cmp(&b.1.id));
    bind_specs.sort_by(|a, b| a.1.id.cmp(&b.1.id));

    let mut seen_ids = std::collections::HashSet::new();
    for (_, spec) in &bind_specs {
      if !seen_ids.insert(spec.id.clone()) {
        return Err(PlanError::DuplicateBindId(spec.id.clone()));
      }
    }

    let graph = DependencyGraph::build(&build_specs, &bind_specs);
    let order = graph.toposort()?;

    let build_map: BTreeMap<_, _> = build_specs.into_iter().collect();
    let bind_map: BTreeMap<_, _> = bind_specs.into_iter().collect();

    let mut builds = Vec::new();
    let mut binds = Vec::new();
    for fp in &order {
      if let Some(spec) = build_map.get(fp) {
        builds.push(BuildNode { fingerprint: *fp, spec: spec.clone() });
      } else if let Some(spec) = bind_map.get(fp) {
        binds.push(BindNode { fingerprint: *fp, spec: spec.clone() });
      }
    }

    let build_diff = diff_builds(&build_map, prior);
    let bind_diff = diff_binds(&bind_map, prior);
    let actions = build_actions(&order, &build_map, &bind_diff);

    Ok(Self {
      builds,
      binds,
      build_diff,
      bind_diff,
      actions,
      graph,
    })
  }

  pub fn reverse_topological_binds(&self) -> Vec<Fingerprint> {
    let mut order: Vec<_> = self.binds.iter().map(|b| b.fingerprint).collect();
    order.reverse();
    order
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }
}

fn diff_builds(new: &BTreeMap<Fingerprint, BuildSpec>, prior: &Manifest) -> Vec<BuildDiffEntry> {
  let mut entries = Vec::new();
  for fp in new.keys() {
    let transition = if prior.builds.contains_key(fp) {
      BuildTransition::Unchanged
    } else {
      BuildTransition::Added
    };
    entries.push(BuildDiffEntry { fingerprint: *fp, transition });
  }
  for fp in prior.builds.keys() {
    if !new.contains_key(fp) {
      entries.push(BuildDiffEntry {
        fingerprint: *fp,
        transition: BuildTransition::Removed,
      });
    }
  }
  entries
}

fn diff_binds(new: &BTreeMap<Fingerprint, BindSpec>, prior: &Manifest) -> Vec<BindDiffEntry> {
  let mut entries = Vec::new();
  let mut matched_prior_ids = std::collections::HashSet::new();

  for (fp, spec) in new {
    let transition = match prior.bind_by_id(&spec.id) {
      None => BindTransition::Added,
      Some((old_fp, _)) if old_fp == fp => {
        matched_prior_ids.insert(spec.id.clone());
        BindTransition::Unchanged
      }
      Some((old_fp, _)) => {
        matched_prior_ids.insert(spec.id.clone());
        if spec.update.is_some() {
          BindTransition::Update { old_fingerprint: *old_fp }
        } else {
          BindTransition::Replace { old_fingerprint: *old_fp }
        }
      }
    };
    entries.push(BindDiffEntry {
      fingerprint: *fp,
      id: spec.id.clone(),
      transition,
    });
  }

  for (old_fp, record) in &prior.binds {
    if !matched_prior_ids.contains(&record.spec.id) {
      entries.push(BindDiffEntry {
        fingerprint: *old_fp,
        id: record.spec.id.clone(),
        transition: BindTransition::Removed { old_fingerprint: *old_fp },
      });
    }
  }

  entries
}

fn build_actions(order: &[Fingerprint], build_map: &BTreeMap<Fingerprint, BuildSpec>, bind_diff: &[BindDiffEntry]) -> Vec<PlannedAction> {
  let mut actions = Vec::new();

  // (a) realize added builds, in dependency order.
  for fp in order {
    if build_map.contains_key(fp) {
      actions.push(PlannedAction::RealizeBuild(*fp));
    }
  }

  // (b) destroy removed binds, in reverse topological order.
  let mut removed: Vec<_> = bind_diff
    .iter()
    .filter_map(|e| match e.transition {
      BindTransition::Removed { old_fingerprint } => Some(old_fingerprint),
      _ => None,
    })
    .collect();
  removed.reverse();
  for fp in removed {
    actions.push(PlannedAction::DestroyBind(fp));
  }

  // (c) create/update changed/added binds, in topological order. A
  // Replace's destroy is interleaved immediately before its create
  // (§4.6: "for a bind with a pending destroy+create in the same apply,
  // the destroy precedes the create").
  for fp in order {
    if let Some(entry) = bind_diff.iter().find(|e| e.fingerprint == *fp) {
      match entry.transition {
        BindTransition::Added => actions.push(PlannedAction::CreateBind(*fp)),
        BindTransition::Update { .. } => actions.push(PlannedAction::UpdateBind(*fp)),
        BindTransition::Replace { old_fingerprint } => {
          actions.push(PlannedAction::DestroyBind(old_fingerprint));
          actions.push(PlannedAction::CreateBind(*fp));
        }
        BindTransition::Unchanged | BindTransition::Removed { .. } => {}
      }
    }
  }

  actions
}
