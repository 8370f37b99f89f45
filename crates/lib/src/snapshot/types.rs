//! Manifest and snapshot index types (§3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::eval::{BindSpec, BuildSpec};
use crate::fingerprint::Fingerprint;

/// One build's record inside a manifest: enough to recompute its
/// fingerprint and to re-run it during rollback/GC without the original
/// evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
  pub spec: BuildSpec,
}

/// One bind's record inside a manifest: its spec plus the outputs recorded
/// the last time it was successfully created/updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindRecord {
  pub spec: BindSpec,
  pub outputs: BTreeMap<String, String>,
}

/// One snapshot's manifest (§3): every build fingerprint realized and every
/// bind, keyed by fingerprint so lookups during diffing are O(log n).
/// Append-only and content-addressed by its own digest once written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  pub builds: BTreeMap<Fingerprint, BuildRecord>,
  pub binds: BTreeMap<Fingerprint, BindRecord>,
}

impl Manifest {
  pub fn digest(&self) -> Fingerprint {
    crate::util::hash::digest_json(self).expect("manifest serialization is infallible")
  }

  /// Find a bind record by declared id, used by the diff (§4.4) to detect
  /// "same id, different fingerprint" (a `Changed` bind) versus a bind that
  /// was simply removed.
  pub fn bind_by_id(&self, id: &str) -> Option<(&Fingerprint, &BindRecord)> {
    self.binds.iter().find(|(_, record)| record.spec.id == id)
  }
}

/// One entry in the snapshot index (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
  pub id: Fingerprint,
  pub created_at_unix: u64,
  pub config_path: Option<String>,
  pub build_count: usize,
  pub bind_count: usize,
  pub tags: Vec<String>,
}
