//! Store object immutability.
//!
//! After a build completes, its store path is write-protected so later
//! consumers cannot accidentally mutate a cached object (§3 invariant: a
//! store object is never mutated after the build completes).

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum ImmutableError {
  #[error("failed to set permissions on {path}: {source}")]
  SetPermissions {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to traverse directory {path}: {source}")]
  WalkDir {
    path: String,
    #[source]
    source: walkdir::Error,
  },
}

/// Recursively write-protect `path`. Unix: clears write bits. Windows: there
/// is no recursive readonly attribute, so a `.immutable` marker file is
/// dropped at the object root instead and consulted by callers that need to
/// know (the GC sweep, mainly) rather than relying on the filesystem to
/// reject writes.
pub fn make_immutable(path: &Path) -> Result<(), ImmutableError> {
  if !path.exists() {
    return Ok(());
  }

  debug!(path = ?path, "making store object immutable");

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;

    for entry in WalkDir::new(path).contents_first(true) {
      let entry = entry.map_err(|e| ImmutableError::WalkDir {
        path: path.display().to_string(),
        source: e,
      })?;
      let is_dir = entry.file_type().is_dir();
      let mode = if is_dir { 0o555 } else { 0o444 };
      if let Err(e) = std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(mode)) {
        warn!(path = ?entry.path(), error = %e, "failed to set read-only permissions, continuing");
      }
    }
  }

  #[cfg(windows)]
  {
    let marker = path.join(".immutable");
    if let Err(e) = std::fs::write(&marker, b"") {
      return Err(ImmutableError::SetPermissions {
        path: marker.display().to_string(),
        source: e,
      });
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_path_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(make_immutable(&missing).is_ok());
  }

  #[cfg(unix)]
  #[test]
  fn file_becomes_read_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("out.txt");
    std::fs::write(&file, b"hello").unwrap();

    make_immutable(dir.path()).unwrap();

    let mode = std::fs::metadata(&file).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o444);
  }
}
