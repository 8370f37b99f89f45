//! `warden rollback` integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, bind_writes_marker};

#[test]
fn rollback_with_no_prior_snapshot_fails() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  env
    .warden_cmd()
    .args(["rollback", "--force"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("no prior snapshot"));
}

#[test]
fn rollback_restores_previous_bind_state() {
  let env = TestEnv::empty();
  let with_bind = bind_writes_marker(&env, "greeting", "created.txt");
  let marker = env.output_path().join("created.txt");

  std::fs::write(&env.decl_path, &with_bind).unwrap();
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();
  assert!(marker.exists());

  std::fs::write(&env.decl_path, r#"{"builds": [], "binds": []}"#).unwrap();
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();
  assert!(!marker.exists());

  env.warden_cmd().args(["rollback", "--force"]).assert().success();
  assert!(marker.exists());
}

#[test]
fn rollback_to_explicit_id() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  let list = env.warden_cmd().args(["snapshot", "list", "-o", "json"]).output().unwrap();
  let parsed: serde_json::Value = serde_json::from_slice(&list.stdout).unwrap();
  let id = parsed[0]["id"].as_str().unwrap().to_string();

  env.warden_cmd().args(["rollback", &id, "--force"]).assert().success();
}
