//! `warden diff` integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, bind_writes_marker};

#[test]
fn diff_against_empty_store_shows_additions() {
  let env = TestEnv::empty();
  let decl = bind_writes_marker(&env, "greeting", "created.txt");
  std::fs::write(&env.decl_path, &decl).unwrap();

  env
    .warden_cmd()
    .arg("diff")
    .arg(&env.decl_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("greeting"));

  // diff never applies anything.
  assert!(!env.output_path().join("created.txt").exists());
}

#[test]
fn diff_after_apply_shows_no_changes() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  env
    .warden_cmd()
    .arg("diff")
    .arg(&env.decl_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("no changes"));
}
