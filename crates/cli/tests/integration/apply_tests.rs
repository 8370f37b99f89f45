//! `warden apply` integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, bind_writes_marker};

#[test]
fn apply_empty_declaration_succeeds() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);

  env
    .warden_cmd()
    .arg("apply")
    .arg(&env.decl_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("apply complete"));
}

#[test]
fn apply_creates_bind_artifact() {
  let env = TestEnv::empty();
  let decl = bind_writes_marker(&env, "greeting", "created.txt");
  std::fs::write(&env.decl_path, &decl).unwrap();

  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  assert!(env.output_path().join("created.txt").exists());
}

#[test]
fn apply_is_idempotent() {
  let env = TestEnv::empty();
  let decl = bind_writes_marker(&env, "greeting", "created.txt");
  std::fs::write(&env.decl_path, &decl).unwrap();

  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  assert!(env.output_path().join("created.txt").exists());
}

#[test]
fn apply_nonexistent_declaration_fails() {
  let env = TestEnv::empty();

  env
    .warden_cmd()
    .arg("apply")
    .arg(env.temp.path().join("missing.json"))
    .assert()
    .failure();
}

#[test]
fn apply_json_output_reports_snapshot_id() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);

  env
    .warden_cmd()
    .arg("apply")
    .arg(&env.decl_path)
    .args(["-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("snapshot_id"));
}

#[test]
fn apply_rejects_unknown_bind_ref() {
  let env = TestEnv::with_declaration(
    r#"{"binds": [{"name": "a", "id": "a", "inputs": {"x": {"kind": "build_ref", "name": "missing"}}, "create": []}]}"#,
  );

  env
    .warden_cmd()
    .arg("apply")
    .arg(&env.decl_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown build"));
}
