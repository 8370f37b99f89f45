//! `warden snapshot` integration tests.

use super::common::TestEnv;

#[test]
fn snapshot_list_empty() {
  let env = TestEnv::empty();

  let output = env.warden_cmd().args(["snapshot", "list"]).output().unwrap();
  assert!(output.status.success());
  assert!(String::from_utf8_lossy(&output.stdout).contains("no snapshots"));
}

#[test]
fn snapshot_list_after_apply_shows_current() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  let output = env.warden_cmd().args(["snapshot", "list"]).output().unwrap();
  assert!(output.status.success());
  assert!(String::from_utf8_lossy(&output.stdout).contains("(current)"));
}

#[test]
fn snapshot_list_json_is_valid() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  let output = env.warden_cmd().args(["snapshot", "list", "-o", "json"]).output().unwrap();
  assert!(output.status.success());
  let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
  assert!(parsed.as_array().unwrap().len() == 1);
}

#[test]
fn snapshot_delete_current_is_rejected() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  let list = env.warden_cmd().args(["snapshot", "list", "-o", "json"]).output().unwrap();
  let parsed: serde_json::Value = serde_json::from_slice(&list.stdout).unwrap();
  let id = parsed[0]["id"].as_str().unwrap();

  let output = env
    .warden_cmd()
    .args(["snapshot", "delete", id, "--force"])
    .output()
    .unwrap();
  assert!(output.status.success());
  assert!(String::from_utf8_lossy(&output.stderr).contains("current"));
}

#[test]
fn snapshot_tag_and_untag_round_trip() {
  let env = TestEnv::with_declaration(r#"{"builds": [], "binds": []}"#);
  env.warden_cmd().arg("apply").arg(&env.decl_path).assert().success();

  let list = env.warden_cmd().args(["snapshot", "list", "-o", "json"]).output().unwrap();
  let parsed: serde_json::Value = serde_json::from_slice(&list.stdout).unwrap();
  let id = parsed[0]["id"].as_str().unwrap().to_string();

  env.warden_cmd().args(["snapshot", "tag", &id, "keep"]).assert().success();

  let tagged = env.warden_cmd().args(["snapshot", "list"]).output().unwrap();
  assert!(String::from_utf8_lossy(&tagged.stdout).contains("[keep]"));

  env.warden_cmd().args(["snapshot", "untag", &id, "keep"]).assert().success();

  let untagged = env.warden_cmd().args(["snapshot", "list"]).output().unwrap();
  assert!(!String::from_utf8_lossy(&untagged.stdout).contains("[keep]"));
}
