//! The input-edge DAG (§4.4 step 1-3): one node per build/bind, edges from
//! every upstream reference to its dependent. Used for cycle detection and
//! to derive both the forward (apply) and reverse (destroy/rollback) orders.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::eval::{BindSpec, BuildSpec, InputEdge};
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
  Build,
  Bind,
}

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("cycle detected among nodes: {0:?}")]
  Cycle(Vec<Fingerprint>),
}

pub struct DependencyGraph {
  graph: DiGraph<Fingerprint, ()>,
  index: HashMap<Fingerprint, NodeIndex>,
  pub kinds: HashMap<Fingerprint, NodeKind>,
}

impl DependencyGraph {
  pub fn build(builds: &[(Fingerprint, BuildSpec)], binds: &[(Fingerprint, BindSpec)]) -> Self {
    let mut graph = DiGraph::new();
    let mut index = HashMap::new();
    let mut kinds = HashMap::new();

    for (fp, _) in builds {
      let idx = graph.add_node(*fp);
      index.insert(*fp, idx);
      kinds.insert(*fp, NodeKind::Build);
    }
    for (fp, _) in binds {
      let idx = graph.add_node(*fp);
      index.insert(*fp, idx);
      kinds.insert(*fp, NodeKind::Bind);
    }

    for (fp, spec) in builds {
      add_edges(&mut graph, &index, *fp, spec.inputs.values());
    }
    for (fp, spec) in binds {
      add_edges(&mut graph, &index, *fp, spec.inputs.values());
    }

    Self { graph, index, kinds }
  }

  /// Topological order, deterministic via `(kind, id)` tie-break is applied
  /// by the caller after this returns — `petgraph::toposort` is itself
  /// deterministic given a deterministic insertion order, which `build`
  /// guarantees by iterating the caller's sorted slices.
  pub fn toposort(&self) -> Result<Vec<Fingerprint>, GraphError> {
    toposort(&self.graph, None)
      .map(|order| order.into_iter().map(|idx| self.graph[idx]).collect())
      .map_err(|cycle| {
        let stuck = self.graph[cycle.node_id()];
        GraphError::Cycle(vec![stuck])
      })
  }

  pub fn dependents_of(&self, fp: &Fingerprint) -> Vec<Fingerprint> {
    let Some(&idx) = self.index.get(fp) else {
      return Vec::new();
    };
    self.graph.neighbors_directed(idx, Direction::Outgoing).map(|n| self.graph[n]).collect()
  }
}

fn add_edges<'a>(graph: &mut DiGraph<Fingerprint, ()>, index: &HashMap<Fingerprint, NodeIndex>, dependent: Fingerprint, edges: impl Iterator<Item = &'a InputEdge>) {
  let Some(&dep_idx) = index.get(&dependent) else { return };
  for edge in edges {
    let upstream = match edge {
      InputEdge::Build(r) => Some(r.0),
      InputEdge::Bind(r) => Some(r.0),
      _ => None,
    };
    if let Some(upstream) = upstream
      && let Some(&up_idx) = index.get(&upstream)
    {
      graph.add_edge(up_idx, dep_idx, ());
    }
  }
}
