//! Ambient configuration (§1.1): store root, worker-count override, and
//! display flags, resolved once at CLI startup and threaded down explicitly
//! rather than read ad hoc from inner modules (Design Notes §9, "no
//! module-level mutable state").

use std::path::PathBuf;

const STORE_ENV: &str = "SYS_STORE";
const WORKERS_ENV: &str = "SYS_WORKERS";

#[derive(Debug, Clone)]
pub struct Config {
  pub store_root: PathBuf,
  pub workers: usize,
  pub no_color: bool,
  pub quiet: bool,
}

impl Config {
  /// Resolve from the environment, following §6 "Environment variables
  /// consumed": `SYS_STORE` overrides the store root, `SYS_WORKERS`
  /// overrides the build worker pool size, `NO_COLOR` disables ANSI (CLI
  /// concern only, but the flag is resolved here so it travels with the
  /// rest of the config).
  pub fn from_env() -> Self {
    Self {
      store_root: store_root_from_env(),
      workers: workers_from_env(),
      no_color: std::env::var_os("NO_COLOR").is_some(),
      quiet: false,
    }
  }
}

fn store_root_from_env() -> PathBuf {
  if let Some(path) = std::env::var_os(STORE_ENV) {
    return PathBuf::from(path);
  }
  dirs::data_dir().unwrap_or_else(std::env::temp_dir).join("warden")
}

fn workers_from_env() -> usize {
  std::env::var(WORKERS_ENV)
    .ok()
    .and_then(|v| v.parse().ok())
    .filter(|n| *n > 0)
    .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn store_env_override_wins() {
    unsafe {
      std::env::set_var(STORE_ENV, "/tmp/explicit-store");
    }
    assert_eq!(Config::from_env().store_root, PathBuf::from("/tmp/explicit-store"));
    unsafe {
      std::env::remove_var(STORE_ENV);
    }
  }

  #[test]
  #[serial]
  fn workers_env_override_wins() {
    unsafe {
      std::env::set_var(WORKERS_ENV, "3");
    }
    assert_eq!(Config::from_env().workers, 3);
    unsafe {
      std::env::remove_var(WORKERS_ENV);
    }
  }

  #[test]
  #[serial]
  fn zero_workers_override_is_ignored() {
    unsafe {
      std::env::set_var(WORKERS_ENV, "0");
    }
    assert!(Config::from_env().workers >= 1);
    unsafe {
      std::env::remove_var(WORKERS_ENV);
    }
  }
}
