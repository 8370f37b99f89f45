//! On-disk layout (§4.2): paths relative to a store root.

use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprint;

pub const COMPLETE_MARKER: &str = ".complete";

#[derive(Debug, Clone)]
pub struct StorePaths {
  root: PathBuf,
}

impl StorePaths {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn obj_dir(&self, fp: &Fingerprint) -> PathBuf {
    self.root.join("obj").join(fp.to_hex())
  }

  pub fn complete_marker(&self, fp: &Fingerprint) -> PathBuf {
    self.obj_dir(fp).join(COMPLETE_MARKER)
  }

  pub fn src_dir(&self, content_hash: &str) -> PathBuf {
    self.root.join("src").join(content_hash)
  }

  pub fn bind_state(&self, fp: &Fingerprint) -> PathBuf {
    self.root.join("bind").join(fp.to_hex()).join("state.json")
  }

  pub fn bind_dir(&self, fp: &Fingerprint) -> PathBuf {
    self.root.join("bind").join(fp.to_hex())
  }

  pub fn snap_dir(&self, id: &Fingerprint) -> PathBuf {
    self.root.join("snap").join(id.to_hex())
  }

  pub fn manifest(&self, id: &Fingerprint) -> PathBuf {
    self.snap_dir(id).join("manifest.json")
  }

  pub fn snap_index(&self) -> PathBuf {
    self.root.join("snap").join("index.json")
  }

  pub fn current_pointer(&self) -> PathBuf {
    self.root.join("snap").join("current")
  }

  pub fn locks_dir(&self) -> PathBuf {
    self.root.join("locks")
  }

  pub fn build_lock(&self, fp: &Fingerprint) -> PathBuf {
    self.locks_dir().join("build").join(fp.to_hex())
  }

  pub fn store_lock(&self) -> PathBuf {
    self.locks_dir().join("store.lock")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn paths_are_rooted() {
    let paths = StorePaths::new("/var/warden");
    let fp = crate::util::hash::digest_bytes(b"x");
    assert!(paths.obj_dir(&fp).starts_with("/var/warden/obj"));
    assert!(paths.manifest(&fp).starts_with("/var/warden/snap"));
  }
}
