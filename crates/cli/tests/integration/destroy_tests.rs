//! `warden destroy` integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, bind_writes_marker};

#[test]
fn destroy_removes_bind_artifact() {
  let env = TestEnv::empty();
  let decl = bind_writes_marker(&env, "greeting", "created.txt");
  std::fs::write(&env.decl_path, &decl).unwrap();
  let marker = env.output_path().join("created.txt");

  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();
  assert!(marker.exists());

  env
    .warden_cmd()
    .arg("destroy")
    .arg("--force")
    .assert()
    .success()
    .stdout(predicate::str::contains("destroy complete"));

  assert!(!marker.exists());
}

#[test]
fn destroy_with_no_snapshot_succeeds() {
  let env = TestEnv::empty();

  env.warden_cmd().arg("destroy").arg("--force").assert().success();
}

#[test]
fn destroy_without_force_in_non_interactive_mode_fails() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  env.warden_cmd().arg("destroy").assert().failure();
}
