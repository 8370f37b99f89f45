use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::eval::BuildSpec;
use crate::fingerprint::Fingerprint;

/// A build node resolved for execution: its fingerprint plus the spec that
/// produced it. The planner (§4.4) hands these to [`crate::build::realize`]
/// in dependency order.
#[derive(Debug, Clone)]
pub struct BuildNode {
  pub fingerprint: Fingerprint,
  pub spec: BuildSpec,
}

impl BuildNode {
  pub fn new(spec: BuildSpec) -> Self {
    let fingerprint = crate::fingerprint::fingerprint_build(&spec);
    Self { fingerprint, spec }
  }
}

/// The realized outputs of a build: names from [`BuildSpec::outputs`] mapped
/// to paths under the build's store object directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutputs(pub BTreeMap<String, PathBuf>);

impl BuildOutputs {
  pub fn get(&self, name: &str) -> Option<&PathBuf> {
    self.0.get(name)
  }
}
