//! Fingerprinting (C1).
//!
//! A fingerprint is a 256-bit digest over the canonical serialization of a
//! node: its kind, its declared id, its sorted input edges, and (for builds)
//! its action program. Canonical serialization uses `BTreeMap` everywhere so
//! the same declaration fingerprints identically on every host — this is
//! what makes the store's cache hits portable across machines.

use serde::Serialize;

use crate::eval::{BindSpec, BuildSpec};
use crate::util::hash::{Digest32, digest_json};

/// A node's fingerprint. Shared by builds and binds: the store does not care
/// which kind of node produced a given fingerprint, only that fingerprints
/// are unique to a (kind, declaration) pair.
pub type Fingerprint = Digest32;

#[derive(Serialize)]
struct BuildCanonical<'a> {
  kind: &'static str,
  id: &'a Option<String>,
  inputs: &'a std::collections::BTreeMap<String, crate::eval::InputEdge>,
  create: &'a crate::eval::ActionProgram,
  outputs: &'a Option<std::collections::BTreeMap<String, String>>,
}

#[derive(Serialize)]
struct BindCanonical<'a> {
  kind: &'static str,
  id: &'a str,
  inputs: &'a std::collections::BTreeMap<String, crate::eval::InputEdge>,
  create: &'a crate::eval::ActionProgram,
  update: &'a Option<crate::eval::ActionProgram>,
  destroy: &'a Option<crate::eval::ActionProgram>,
  check: &'a Option<crate::eval::ActionProgram>,
}

/// Fingerprint a build node. `InputEdge::Build`/`InputEdge::Bind` already
/// carry the upstream fingerprint (assigned when that node was registered),
/// so this needs no separate graph walk — canonicalization alone captures
/// the full transitive identity.
pub fn fingerprint_build(spec: &BuildSpec) -> Fingerprint {
  let canonical = BuildCanonical {
    kind: "build",
    id: &spec.id,
    inputs: &spec.inputs,
    create: &spec.create,
    outputs: &spec.outputs,
  };
  // Canonical serialization never fails: every field is a plain data type.
  digest_json(&canonical).expect("fingerprint serialization is infallible")
}

/// Fingerprint a bind node. See [`fingerprint_build`].
pub fn fingerprint_bind(spec: &BindSpec) -> Fingerprint {
  let canonical = BindCanonical {
    kind: "bind",
    id: &spec.id,
    inputs: &spec.inputs,
    create: &spec.create,
    update: &spec.update,
    destroy: &spec.destroy,
    check: &spec.check,
  };
  digest_json(&canonical).expect("fingerprint serialization is infallible")
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::eval::{ActionStep, BuildSpec, InputEdge, Literal};

  fn sample_build(name: &str) -> BuildSpec {
    BuildSpec {
      id: Some(name.to_string()),
      inputs: BTreeMap::new(),
      create: vec![ActionStep::Exec {
        bin: "true".into(),
        args: vec![],
        env: BTreeMap::new(),
        cwd: None,
      }],
      outputs: None,
    }
  }

  #[test]
  fn determinism_across_recomputation() {
    let spec = sample_build("echo-1.0.0");
    assert_eq!(fingerprint_build(&spec), fingerprint_build(&spec));
  }

  #[test]
  fn differing_id_differs() {
    assert_ne!(
      fingerprint_build(&sample_build("a")),
      fingerprint_build(&sample_build("b"))
    );
  }

  #[test]
  fn map_key_order_does_not_affect_fingerprint() {
    let mut spec_a = sample_build("x");
    spec_a.inputs.insert("b".into(), InputEdge::Literal(Literal::Bool(true)));
    spec_a.inputs.insert("a".into(), InputEdge::Literal(Literal::Bool(false)));

    let mut spec_b = sample_build("x");
    spec_b.inputs.insert("a".into(), InputEdge::Literal(Literal::Bool(false)));
    spec_b.inputs.insert("b".into(), InputEdge::Literal(Literal::Bool(true)));

    // BTreeMap serializes sorted regardless of insertion order.
    assert_eq!(fingerprint_build(&spec_a), fingerprint_build(&spec_b));
  }

  #[test]
  fn upstream_fingerprint_participates_in_dependent_fingerprint() {
    let mut reg = crate::eval::Registry::new();
    let upstream = reg.register_build(sample_build("base"));

    let mut inputs_a = BTreeMap::new();
    inputs_a.insert("base".into(), InputEdge::Build(upstream.clone()));
    let dependent_a = fingerprint_build(&BuildSpec {
      id: Some("dependent".into()),
      inputs: inputs_a,
      create: vec![],
      outputs: None,
    });

    let mut inputs_b = BTreeMap::new();
    inputs_b.insert("base".into(), InputEdge::Build(crate::eval::BuildRef(upstream.0)));
    // Same upstream ref: identical fingerprint.
    let dependent_b = fingerprint_build(&BuildSpec {
      id: Some("dependent".into()),
      inputs: inputs_b,
      create: vec![],
      outputs: None,
    });

    assert_eq!(dependent_a, dependent_b);
  }
}
