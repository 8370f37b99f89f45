//! Garbage Collector (C10).
//!
//! Roots are every fingerprint reachable from any snapshot in the index
//! (not just the current one — older snapshots are still rollback targets)
//! plus every content hash referenced by an `InputEdge::Path`/`Remote`/`Git`
//! edge reachable from those same manifests. Everything under `obj/` and
//! `src/` not in the closure is deleted.

use std::collections::HashSet;

use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use crate::eval::InputEdge;
use crate::fingerprint::Fingerprint;
use crate::lock::{FileLock, LockError, LockMode, acquire_store_lock};
use crate::snapshot::{Manifest, SnapshotError, SnapshotStore};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum GcError {
  #[error("gc refused: a build is in progress ({0} lock(s) held)")]
  Busy(usize),
  #[error(transparent)]
  Snapshot(#[from] SnapshotError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Lock(#[from] LockError),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcStats {
  pub objects_scanned: usize,
  pub objects_deleted: usize,
  pub sources_scanned: usize,
  pub sources_deleted: usize,
  pub bytes_reclaimed: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcResult {
  pub stats: GcStats,
  pub deleted_objects: Vec<Fingerprint>,
  pub deleted_sources: Vec<String>,
}

/// Walk every manifest in the snapshot index and collect the set of live
/// build/bind fingerprints and content hashes, following the teacher's
/// `collect_live_hashes`.
fn collect_live(manifests: &[Manifest]) -> (HashSet<Fingerprint>, HashSet<String>) {
  let mut live_fps = HashSet::new();
  let mut live_hashes = HashSet::new();

  for manifest in manifests {
    for fp in manifest.builds.keys() {
      live_fps.insert(*fp);
    }
    for fp in manifest.binds.keys() {
      live_fps.insert(*fp);
    }
    for record in manifest.builds.values() {
      collect_input_hashes(record.spec.inputs.values(), &mut live_hashes);
    }
    for record in manifest.binds.values() {
      collect_input_hashes(record.spec.inputs.values(), &mut live_hashes);
    }
  }

  (live_fps, live_hashes)
}

fn collect_input_hashes<'a>(edges: impl Iterator<Item = &'a InputEdge>, out: &mut HashSet<String>) {
  for edge in edges {
    match edge {
      InputEdge::Path { digest } => {
        out.insert(digest.to_hex());
      }
      InputEdge::Remote { sha256, .. } => {
        out.insert(sha256.clone());
      }
      InputEdge::Git { commit, .. } => {
        out.insert(commit.clone());
      }
      InputEdge::Build(_) | InputEdge::Bind(_) | InputEdge::Literal(_) => {}
    }
  }
}

fn dir_size(path: &std::path::Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

/// Non-blocking sweep of `locks/build/*`: any lock we can't immediately
/// acquire belongs to a live builder (§4.10: "refuses with gc_busy if any
/// build lock is currently held").
fn count_held_build_locks(store: &Store) -> usize {
  let dir = store.paths().locks_dir().join("build");
  let Ok(entries) = std::fs::read_dir(&dir) else {
    return 0;
  };

  let mut held = 0;
  for entry in entries.flatten() {
    match FileLock::try_acquire(&entry.path(), LockMode::Exclusive) {
      Ok(_guard) => {} // released immediately, was free
      Err(LockError::Contention { .. }) => held += 1,
      Err(_) => {}
    }
  }
  held
}

/// Run a full collection. Takes the store-wide exclusive lock for the
/// duration, so no snapshot write or build promotion can race with deletion.
pub fn collect(store: &Store) -> Result<GcResult, GcError> {
  let _lock = acquire_store_lock(store.paths(), LockMode::Exclusive)?;

  let held = count_held_build_locks(store);
  if held > 0 {
    return Err(GcError::Busy(held));
  }

  let snapshots = SnapshotStore::new(store);
  let manifests: Vec<Manifest> = snapshots.list()?.iter().map(|meta| snapshots.load(&meta.id)).collect::<Result<_, _>>()?;

  let (live_fps, live_hashes) = collect_live(&manifests);

  let mut stats = GcStats::default();
  let mut deleted_objects = Vec::new();
  let mut deleted_sources = Vec::new();

  let obj_root = store.paths().root().join("obj");
  if obj_root.is_dir() {
    for entry in std::fs::read_dir(&obj_root)? {
      let entry = entry?;
      stats.objects_scanned += 1;
      let Ok(fp) = Fingerprint::from_hex(&entry.file_name().to_string_lossy()) else {
        continue;
      };
      if live_fps.contains(&fp) {
        continue;
      }
      let path = entry.path();
      stats.bytes_reclaimed += dir_size(&path);
      remove_possibly_readonly(&path)?;
      stats.objects_deleted += 1;
      deleted_objects.push(fp);
    }
  }

  let src_root = store.paths().root().join("src");
  if src_root.is_dir() {
    for entry in std::fs::read_dir(&src_root)? {
      let entry = entry?;
      stats.sources_scanned += 1;
      let name = entry.file_name().to_string_lossy().to_string();
      if live_hashes.contains(&name) {
        continue;
      }
      let path = entry.path();
      stats.bytes_reclaimed += dir_size(&path);
      remove_possibly_readonly(&path)?;
      stats.sources_deleted += 1;
      deleted_sources.push(name);
    }
  }

  info!(
    objects_deleted = stats.objects_deleted,
    sources_deleted = stats.sources_deleted,
    bytes_reclaimed = stats.bytes_reclaimed,
    "gc complete"
  );

  Ok(GcResult {
    stats,
    deleted_objects,
    deleted_sources,
  })
}

/// Store objects are made read-only on promotion (§4.2); clear that before
/// recursive removal.
fn remove_possibly_readonly(path: &std::path::Path) -> std::io::Result<()> {
  for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
    let meta = entry.metadata()?;
    if meta.permissions().readonly() {
      let mut perms = meta.permissions();
      #[allow(clippy::permissions_set_readonly_false)]
      perms.set_readonly(false);
      let _ = std::fs::set_permissions(entry.path(), perms);
    }
  }
  std::fs::remove_dir_all(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::eval::{BindSpec, BuildSpec};
  use crate::snapshot::{BindRecord, BuildRecord};

  fn manifest_with_build(fp: Fingerprint) -> Manifest {
    let mut manifest = Manifest::default();
    manifest.builds.insert(
      fp,
      BuildRecord {
        spec: BuildSpec {
          id: Some("kept".into()),
          inputs: Default::default(),
          create: vec![],
          outputs: None,
        },
      },
    );
    manifest
  }

  #[test]
  fn unreferenced_object_is_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());

    let live_fp = crate::util::hash::digest_bytes(b"live");
    let dead_fp = crate::util::hash::digest_bytes(b"dead");

    for fp in [&live_fp, &dead_fp] {
      std::fs::create_dir_all(store.paths().obj_dir(fp)).unwrap();
      std::fs::write(store.paths().complete_marker(fp), b"").unwrap();
    }

    let snapshots = SnapshotStore::new(&store);
    let manifest = manifest_with_build(live_fp);
    let id = snapshots.write(&manifest, None, 0).unwrap();
    snapshots.set_current(&id).unwrap();

    let result = collect(&store).unwrap();

    assert!(store.paths().obj_dir(&live_fp).exists());
    assert!(!store.paths().obj_dir(&dead_fp).exists());
    assert_eq!(result.deleted_objects, vec![dead_fp]);
  }

  #[test]
  fn referenced_source_hash_survives_collection() {
    use std::collections::BTreeMap;

    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());

    let live_digest = crate::util::hash::digest_bytes(b"src-live");
    let dead_hash = "deadbeef".to_string();

    std::fs::create_dir_all(store.paths().src_dir(&live_digest.to_hex())).unwrap();
    std::fs::create_dir_all(store.paths().src_dir(&dead_hash)).unwrap();

    let mut inputs = BTreeMap::new();
    inputs.insert("src".to_string(), InputEdge::Path { digest: live_digest });

    let mut manifest = Manifest::default();
    manifest.binds.insert(
      crate::util::hash::digest_bytes(b"bind"),
      BindRecord {
        spec: BindSpec {
          id: "b".into(),
          inputs,
          create: vec![],
          update: None,
          destroy: None,
          check: None,
        },
        outputs: BTreeMap::new(),
      },
    );

    let snapshots = SnapshotStore::new(&store);
    let id = snapshots.write(&manifest, None, 0).unwrap();
    snapshots.set_current(&id).unwrap();

    let result = collect(&store).unwrap();

    assert!(store.paths().src_dir(&live_digest.to_hex()).exists());
    assert!(!store.paths().src_dir(&dead_hash).exists());
    assert_eq!(result.deleted_sources, vec![dead_hash]);
  }

  #[test]
  fn gc_refuses_while_a_build_lock_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path());
    let fp = crate::util::hash::digest_bytes(b"building");

    let _held = crate::lock::acquire_build_lock(store.paths(), &fp).unwrap();

    let err = collect(&store).unwrap_err();
    assert!(matches!(err, GcError::Busy(1)));
  }
}
