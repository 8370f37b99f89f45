//! Snapshot Store (C7): `list`, `load`, `write`, `set_current`, `delete`,
//! `update_tags`. Writes are serialized by the exclusive store lock.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::info;

use crate::fingerprint::Fingerprint;
use crate::lock::{LockError, LockMode, acquire_store_lock};
use crate::snapshot::types::{Manifest, SnapshotMeta};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot {0} not found")]
  NotFound(String),
  #[error("cannot delete the current snapshot; set_current to another snapshot first")]
  CannotDeleteCurrent,
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Lock(#[from] LockError),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

pub struct SnapshotStore<'a> {
  store: &'a Store,
}

impl<'a> SnapshotStore<'a> {
  pub fn new(store: &'a Store) -> Self {
    Self { store }
  }

  pub fn list(&self) -> Result<Vec<SnapshotMeta>, SnapshotError> {
    let path = self.store.paths().snap_index();
    if !path.is_file() {
      return Ok(Vec::new());
    }
    let bytes = std::fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  fn write_index(&self, index: &[SnapshotMeta]) -> Result<(), SnapshotError> {
    let bytes = serde_json::to_vec_pretty(index)?;
    self.store.atomic_write(&self.store.paths().snap_index(), &bytes)?;
    Ok(())
  }

  pub fn load(&self, id: &Fingerprint) -> Result<Manifest, SnapshotError> {
    let path = self.store.paths().manifest(id);
    if !path.is_file() {
      return Err(SnapshotError::NotFound(id.to_hex()));
    }
    let bytes = std::fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  pub fn current(&self) -> Result<Option<Fingerprint>, SnapshotError> {
    let path = self.store.paths().current_pointer();
    if !path.is_file() {
      return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
      return Ok(None);
    }
    Ok(Some(Fingerprint::from_hex(trimmed).map_err(|_| SnapshotError::NotFound(trimmed.to_string()))?))
  }

  pub fn current_manifest(&self) -> Result<Manifest, SnapshotError> {
    match self.current()? {
      Some(id) => self.load(&id),
      None => Ok(Manifest::default()),
    }
  }

  /// Write a new, immutable manifest and append it to the index. Does not
  /// advance the current pointer — callers do that explicitly via
  /// [`Self::set_current`] only after every planned action has succeeded
  /// (§5 ordering guarantee 3).
  pub fn write(&self, manifest: &Manifest, config_path: Option<String>, created_at_unix: u64) -> Result<Fingerprint, SnapshotError> {
    let _lock = acquire_store_lock(self.store.paths(), LockMode::Exclusive)?;

    let id = manifest.digest();
    let manifest_bytes = serde_json::to_vec_pretty(manifest)?;
    self.store.atomic_write(&self.store.paths().manifest(&id), &manifest_bytes)?;

    let mut index = self.list()?;
    if !index.iter().any(|m| m.id == id) {
      index.push(SnapshotMeta {
        id,
        created_at_unix,
        config_path,
        build_count: manifest.builds.len(),
        bind_count: manifest.binds.len(),
        tags: Vec::new(),
      });
      self.write_index(&index)?;
    }

    info!(id = %id.short(), "snapshot written");
    Ok(id)
  }

  pub fn set_current(&self, id: &Fingerprint) -> Result<(), SnapshotError> {
    let _lock = acquire_store_lock(self.store.paths(), LockMode::Exclusive)?;
    if !self.store.paths().manifest(id).is_file() {
      return Err(SnapshotError::NotFound(id.to_hex()));
    }
    self.store.atomic_write(&self.store.paths().current_pointer(), id.to_hex().as_bytes())?;
    Ok(())
  }

  pub fn clear_current(&self) -> Result<(), SnapshotError> {
    let _lock = acquire_store_lock(self.store.paths(), LockMode::Exclusive)?;
    self.store.atomic_write(&self.store.paths().current_pointer(), b"")?;
    Ok(())
  }

  pub fn delete(&self, id: &Fingerprint) -> Result<(), SnapshotError> {
    let _lock = acquire_store_lock(self.store.paths(), LockMode::Exclusive)?;

    if self.current()? == Some(*id) {
      return Err(SnapshotError::CannotDeleteCurrent);
    }

    let mut index = self.list()?;
    let before = index.len();
    index.retain(|m| m.id != *id);
    if index.len() == before {
      return Err(SnapshotError::NotFound(id.to_hex()));
    }
    self.write_index(&index)?;

    let dir = self.store.paths().snap_dir(id);
    if dir.exists() {
      std::fs::remove_dir_all(dir)?;
    }
    Ok(())
  }

  pub fn update_tags(&self, id: &Fingerprint, tags: Vec<String>) -> Result<(), SnapshotError> {
    let _lock = acquire_store_lock(self.store.paths(), LockMode::Exclusive)?;

    let mut index = self.list()?;
    let entry = index.iter_mut().find(|m| m.id == *id).ok_or_else(|| SnapshotError::NotFound(id.to_hex()))?;
    entry.tags = tags;
    self.write_index(&index)
  }
}

pub fn now_unix() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
