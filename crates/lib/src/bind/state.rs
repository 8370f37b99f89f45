//! Persisted bind state (§3): `{id, fingerprint, outputs, snapshot_id}`,
//! written after each successful phase, deleted on successful `destroy`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindState {
  pub id: String,
  pub fingerprint: Fingerprint,
  pub outputs: BTreeMap<String, String>,
  pub snapshot_id: Fingerprint,
}

#[derive(Debug, Error)]
pub enum BindStateError {
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("failed to parse bind state at {path}: {source}")]
  Parse {
    path: std::path::PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Reads and writes `bind/<fp>/state.json` for a single store.
pub struct BindStateStore<'a> {
  store: &'a Store,
}

impl<'a> BindStateStore<'a> {
  pub fn new(store: &'a Store) -> Self {
    Self { store }
  }

  pub fn load(&self, fp: &Fingerprint) -> Result<Option<BindState>, BindStateError> {
    let path = self.store.paths().bind_state(fp);
    if !path.is_file() {
      return Ok(None);
    }
    let contents = std::fs::read(&path)?;
    let state = serde_json::from_slice(&contents).map_err(|source| BindStateError::Parse { path, source })?;
    Ok(Some(state))
  }

  /// Write state after a successful `create`/`update` (§4.6: "persist...
  /// after the thunk returns successfully").
  pub fn save(&self, state: &BindState) -> Result<(), BindStateError> {
    let path = self.store.paths().bind_state(&state.fingerprint);
    let bytes = serde_json::to_vec_pretty(state)?;
    self.store.atomic_write(&path, &bytes)?;
    Ok(())
  }

  /// Delete state after a successful `destroy`. Idempotent: deleting an
  /// already-absent bind's state is not an error.
  pub fn delete(&self, fp: &Fingerprint) -> Result<(), BindStateError> {
    let dir = self.store.paths().bind_dir(fp);
    if dir.exists() {
      std::fs::remove_dir_all(dir)?;
    }
    Ok(())
  }
}

impl From<serde_json::Error> for BindStateError {
  fn from(source: serde_json::Error) -> Self {
    BindStateError::Parse {
      path: std::path::PathBuf::new(),
      source,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample(fp: Fingerprint) -> BindState {
    BindState {
      id: "my-bind".into(),
      fingerprint: fp,
      outputs: BTreeMap::from([("path".to_string(), "/etc/x".to_string())]),
      snapshot_id: crate::util::hash::digest_bytes(b"snap"),
    }
  }

  #[test]
  fn save_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let states = BindStateStore::new(&store);
    let fp = crate::util::hash::digest_bytes(b"bind");

    states.save(&sample(fp)).unwrap();
    let loaded = states.load(&fp).unwrap().unwrap();
    assert_eq!(loaded, sample(fp));
  }

  #[test]
  fn load_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let states = BindStateStore::new(&store);
    let fp = crate::util::hash::digest_bytes(b"nope");

    assert_eq!(states.load(&fp).unwrap(), None);
  }

  #[test]
  fn delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let states = BindStateStore::new(&store);
    let fp = crate::util::hash::digest_bytes(b"bind");

    states.save(&sample(fp)).unwrap();
    states.delete(&fp).unwrap();
    states.delete(&fp).unwrap();
    assert_eq!(states.load(&fp).unwrap(), None);
  }
}
