//! `warden gc` integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn gc_with_empty_store_succeeds() {
  let env = TestEnv::empty();

  env
    .warden_cmd()
    .arg("gc")
    .assert()
    .success()
    .stdout(predicate::str::contains("nothing to collect"));
}

#[test]
fn gc_json_output_reports_stats() {
  let env = TestEnv::empty();

  env
    .warden_cmd()
    .arg("gc")
    .args(["-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("objects_deleted"))
    .stdout(predicate::str::contains("bytes_reclaimed"));
}
