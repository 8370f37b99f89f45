//! `SourceFetcher` is a capability contract, not an implementation. HTTP/Git
//! fetchers and archive extractors are explicitly out of scope (§1): the
//! host wires a real implementation in; this crate ships only a
//! filesystem-backed reference implementation used by tests and for
//! `file://`-style local sources.

use std::path::PathBuf;

use thiserror::Error;

use crate::eval::InputEdge;

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("declared content hash {declared} does not match fetched content hash {actual}")]
  HashMismatch { declared: String, actual: String },
  #[error("unsupported source edge for this fetcher")]
  Unsupported,
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Materializes a source object for a `Remote`/`Git` [`InputEdge`] into
/// `dest`, verifying the declared content hash. A mismatch here is exactly
/// the `fingerprint_mismatch` error kind from §7 — it surfaces as a build
/// failure, not a silent cache corruption.
pub trait SourceFetcher: Send + Sync {
  fn fetch(&self, edge: &InputEdge, dest: &std::path::Path) -> Result<PathBuf, FetchError>;
}

/// Resolves `Remote` edges whose URL is a `file://` path already present on
/// disk, and verifies the declared sha256 against the file's contents.
/// Standing in for a real HTTP/Git fetcher in tests (§1 non-goal).
#[derive(Default)]
pub struct LocalFetcher;

impl SourceFetcher for LocalFetcher {
  fn fetch(&self, edge: &InputEdge, dest: &std::path::Path) -> Result<PathBuf, FetchError> {
    let InputEdge::Remote { url, sha256, .. } = edge else {
      return Err(FetchError::Unsupported);
    };

    let src_path = url.strip_prefix("file://").ok_or(FetchError::Unsupported)?;
    let bytes = std::fs::read(src_path)?;
    let actual = crate::util::hash::digest_bytes(&bytes).to_hex();
    if actual != *sha256 {
      return Err(FetchError::HashMismatch {
        declared: sha256.clone(),
        actual,
      });
    }

    std::fs::create_dir_all(dest.parent().unwrap_or(dest))?;
    std::fs::write(dest, &bytes)?;
    Ok(dest.to_path_buf())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn matching_hash_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.bin");
    std::fs::write(&src, b"payload").unwrap();
    let sha = crate::util::hash::digest_bytes(b"payload").to_hex();

    let edge = InputEdge::Remote {
      url: format!("file://{}", src.display()),
      sha256: sha,
      format: "raw".into(),
    };

    let dest = dir.path().join("out.bin");
    LocalFetcher.fetch(&edge, &dest).unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
  }

  #[test]
  fn mismatched_hash_fails() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.bin");
    std::fs::write(&src, b"payload").unwrap();

    let edge = InputEdge::Remote {
      url: format!("file://{}", src.display()),
      sha256: "0000000000000000000000000000000000000000000000000000000000000000".into(),
      format: "raw".into(),
    };

    let dest = dir.path().join("out.bin");
    let err = LocalFetcher.fetch(&edge, &dest).unwrap_err();
    assert!(matches!(err, FetchError::HashMismatch { .. }));
  }
}
