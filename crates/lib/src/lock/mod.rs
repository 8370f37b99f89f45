//! Locking (C11): a store-wide shared/exclusive lock and per-fingerprint
//! build locks, both backed by advisory file locks.
//!
//! Grounded in the teacher's `store_lock.rs`, which hand-rolls this with
//! `OpenOptions` plus a platform lock syscall rather than a locking crate;
//! this spec keeps that approach (no new dependency) and adds the second
//! lock kind (per-fingerprint build locks) the distilled spec requires.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to create lock directory {path}: {source}")]
  CreateDir { path: PathBuf, source: io::Error },
  #[error("failed to open lock file {path}: {source}")]
  OpenFile { path: PathBuf, source: io::Error },
  #[error("store is locked by another process: {path}")]
  Contention { path: PathBuf },
}

/// A held lock on `path`. Released when dropped — the OS releases the
/// advisory lock when the file descriptor closes.
pub struct FileLock {
  _file: File,
  path: PathBuf,
}

impl FileLock {
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Try to acquire once, returning `Contention` immediately rather than
  /// blocking.
  pub fn try_acquire(path: &Path, mode: LockMode) -> Result<Self, LockError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| LockError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(path)
      .map_err(|source| LockError::OpenFile {
        path: path.to_path_buf(),
        source,
      })?;

    try_lock_file(&file, mode).ok_or_else(|| LockError::Contention { path: path.to_path_buf() })?;

    Ok(Self {
      _file: file,
      path: path.to_path_buf(),
    })
  }

  /// Block until acquired, polling at `interval` (§4.11: "contention blocks
  /// with a polite poll interval").
  pub fn acquire_blocking(path: &Path, mode: LockMode, interval: Duration) -> Result<Self, LockError> {
    loop {
      match Self::try_acquire(path, mode) {
        Ok(lock) => return Ok(lock),
        Err(LockError::Contention { .. }) => {
          debug!(path = ?path, "lock contended, polling");
          std::thread::sleep(interval);
        }
        Err(other) => return Err(other),
      }
    }
  }
}

#[cfg(unix)]
fn try_lock_file(file: &File, mode: LockMode) -> Option<()> {
  use std::os::fd::AsRawFd;

  let op = match mode {
    LockMode::Shared => libc::LOCK_SH,
    LockMode::Exclusive => libc::LOCK_EX,
  } | libc::LOCK_NB;

  // SAFETY: `file`'s fd is valid for the duration of the call.
  let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
  if rc == 0 { Some(()) } else { None }
}

#[cfg(windows)]
fn try_lock_file(file: &File, mode: LockMode) -> Option<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Storage::FileSystem::{
    LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx,
  };

  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  let mut overlapped = unsafe { std::mem::zeroed() };
  // SAFETY: handle is valid for the call; overlapped is zeroed per the API contract.
  let ok = unsafe { LockFileEx(file.as_raw_handle() as _, flags, 0, u32::MAX, u32::MAX, &mut overlapped) };
  if ok != 0 { Some(()) } else { None }
}

/// Acquire the exclusive per-fingerprint build lock at `locks/build/<fp>`
/// (§4.11). Contention blocks; the lock file doubles as a rendezvous so a
/// second waiter, on acquiring, re-checks completeness before building.
pub fn acquire_build_lock(paths: &crate::store::StorePaths, fp: &crate::fingerprint::Fingerprint) -> Result<FileLock, LockError> {
  FileLock::acquire_blocking(&paths.build_lock(fp), LockMode::Exclusive, Duration::from_millis(50))
}

/// Acquire the store-wide lock (§4.11): shared for reads, exclusive for
/// snapshot writes / GC / tag mutations.
pub fn acquire_store_lock(paths: &crate::store::StorePaths, mode: LockMode) -> Result<FileLock, LockError> {
  FileLock::acquire_blocking(&paths.store_lock(), mode, Duration::from_millis(50))
}
