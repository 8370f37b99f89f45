//! Content-addressed store (C2).
//!
//! All writes go through a temp directory on the same filesystem and an
//! atomic rename into place, so a crash mid-write never leaves a partial
//! object visible to another process (§4.2).

pub mod paths;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use paths::StorePaths;

use crate::fingerprint::Fingerprint;
use crate::platform;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create directory {path}: {source}")]
  CreateDir { path: PathBuf, source: io::Error },
  #[error("failed to rename {from} to {to}: {source}")]
  Rename { from: PathBuf, to: PathBuf, source: io::Error },
  #[error("failed to make store object immutable: {0}")]
  Immutable(#[from] platform::ImmutableError),
  #[error(transparent)]
  Io(#[from] io::Error),
}

/// A handle to a store root. Cheap to clone (wraps a single `PathBuf`);
/// every operation re-derives paths from [`StorePaths`] rather than caching
/// file handles, matching the stateless style of the teacher's
/// `snapshot::storage::SnapshotStore`.
#[derive(Debug, Clone)]
pub struct Store {
  paths: StorePaths,
}

impl Store {
  pub fn open(root: impl Into<PathBuf>) -> Self {
    Self {
      paths: StorePaths::new(root),
    }
  }

  pub fn paths(&self) -> &StorePaths {
    &self.paths
  }

  /// True if `fp`'s store object exists and is fully written.
  pub fn is_complete(&self, fp: &Fingerprint) -> bool {
    self.paths.complete_marker(fp).is_file()
  }

  /// Allocate a fresh staging directory for a build realization. The caller
  /// writes outputs here, then calls [`Self::promote`] to commit it.
  pub fn stage(&self) -> Result<tempfile::TempDir, StoreError> {
    let staging_root = self.paths.root().join("tmp");
    std::fs::create_dir_all(&staging_root).map_err(|source| StoreError::CreateDir {
      path: staging_root.clone(),
      source,
    })?;
    Ok(tempfile::TempDir::new_in(&staging_root)?)
  }

  /// Atomically move `staging` into `obj/<fp>/` and mark it complete and
  /// read-only. Idempotent: if another process already completed this
  /// fingerprint (the build-lock rendezvous case, §4.11), the staging
  /// directory is simply discarded.
  pub fn promote(&self, fp: &Fingerprint, staging: tempfile::TempDir) -> Result<PathBuf, StoreError> {
    let dest = self.paths.obj_dir(fp);

    if self.is_complete(fp) {
      debug!(fp = %fp.short(), "object already complete, discarding redundant staging dir");
      drop(staging);
      return Ok(dest);
    }

    if let Some(parent) = dest.parent() {
      std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let staging_path = staging.into_path();
    std::fs::rename(&staging_path, &dest).map_err(|source| StoreError::Rename {
      from: staging_path.clone(),
      to: dest.clone(),
      source,
    })?;

    std::fs::write(self.paths.complete_marker(fp), b"")?;
    platform::make_immutable(&dest)?;

    Ok(dest)
  }

  /// Write `contents` to `path` atomically via a same-directory temp file
  /// and rename (§4.2). Used for manifests, the snapshot index, the current
  /// pointer, and bind state — every mutable metadata file in the store.
  pub fn atomic_write(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
      path: parent.to_path_buf(),
      source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    use std::io::Write;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Rename {
      from: e.file.path().to_path_buf(),
      to: path.to_path_buf(),
      source: e.error,
    })?;
    Ok(())
  }
}
