//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment: its own store root and declaration file, so
/// tests never interfere with each other or a real `$SYS_STORE`.
pub struct TestEnv {
  pub temp: TempDir,
  pub decl_path: PathBuf,
}

impl TestEnv {
  pub fn empty() -> Self {
    let temp = TempDir::new().unwrap();
    let decl_path = temp.path().join("decl.json");
    Self { temp, decl_path }
  }

  pub fn with_declaration(decl_json: &str) -> Self {
    let env = Self::empty();
    std::fs::write(&env.decl_path, decl_json).unwrap();
    env
  }

  pub fn store_path(&self) -> PathBuf {
    let p = self.temp.path().join("store");
    std::fs::create_dir_all(&p).unwrap();
    p
  }

  pub fn output_path(&self) -> PathBuf {
    let p = self.temp.path().join("output");
    std::fs::create_dir_all(&p).unwrap();
    p
  }

  /// A pre-configured `Command` for the `warden` binary, pointed at this
  /// environment's isolated store.
  pub fn warden_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("warden");
    cmd.env("SYS_STORE", self.store_path());
    cmd
  }
}

/// A single-bind declaration whose `create` action writes `marker` (relative
/// to the test's output dir) and whose `destroy` removes it.
pub fn bind_writes_marker(env: &TestEnv, id: &str, marker: &str) -> String {
  let marker_path = env.output_path().join(marker);
  serde_json::json!({
    "binds": [{
      "name": id,
      "id": id,
      "create": [{"Exec": {"bin": "/usr/bin/touch", "args": [marker_path.to_str().unwrap()], "env": {}, "cwd": null}}],
      "destroy": [{"Exec": {"bin": "/bin/rm", "args": ["-f", marker_path.to_str().unwrap()], "env": {}, "cwd": null}}],
      "check": [{"Exec": {"bin": "/usr/bin/test", "args": ["-e", marker_path.to_str().unwrap()], "env": {}, "cwd": null}}]
    }]
  })
  .to_string()
}
