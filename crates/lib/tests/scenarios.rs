//! End-to-end scenarios S1-S6 from the testable-properties section,
//! exercising `apply`/`destroy` against an in-process [`Registry`] standing
//! in for the external script evaluator.

use std::collections::BTreeMap;

use warden_core::bind::check;
use warden_core::config::Config;
use warden_core::eval::{ActionStep, BindSpec, BuildSpec, InputEdge, Literal, Registry};
use warden_core::fetch::LocalFetcher;
use warden_core::store::Store;
use warden_core::{apply, bind};

fn sh(cmd: &str) -> Vec<ActionStep> {
  vec![ActionStep::Exec {
    bin: "/bin/sh".into(),
    args: vec!["-c".into(), cmd.into()],
    env: BTreeMap::new(),
    cwd: None,
  }]
}

#[tokio::test]
async fn s1_create_destroy_file_bind() {
  let store_dir = tempfile::tempdir().unwrap();
  let store = Store::open(store_dir.path());
  let config = Config::from_env();

  let work = tempfile::tempdir().unwrap();
  let target = work.path().join("created.txt");

  let mut registry = Registry::new();
  registry.register_bind(BindSpec {
    id: "file-bind".into(),
    inputs: BTreeMap::new(),
    create: sh(&format!("printf 'created\\n' > {}", target.display())),
    update: None,
    destroy: Some(sh(&format!("rm -f {}", target.display()))),
    check: None,
  });

  let report = apply::apply(&store, &config, registry, &LocalFetcher, None).await;
  assert!(report.error.is_none());
  assert_eq!(std::fs::read_to_string(&target).unwrap(), "created\n");

  let snapshots = warden_core::snapshot::SnapshotStore::new(&store);
  let manifest = snapshots.load(&report.snapshot_id.unwrap()).unwrap();
  assert_eq!(manifest.binds.len(), 1);
  assert_eq!(manifest.builds.len(), 0);

  apply::destroy(&store, &LocalFetcher).await.unwrap();
  assert!(!target.exists());
  assert_eq!(snapshots.current().unwrap(), None);
}

#[tokio::test]
async fn s2_build_cache_hit() {
  let store_dir = tempfile::tempdir().unwrap();
  let store = Store::open(store_dir.path());
  let config = Config::from_env();

  let build = || BuildSpec {
    id: Some("echo-1.0.0".into()),
    inputs: BTreeMap::new(),
    create: sh("printf 'hello' > ${out}/hello.txt"),
    outputs: Some(BTreeMap::from([("out".into(), "${out}/hello.txt".into())])),
  };

  let mut first = Registry::new();
  let build_ref = first.register_build(build());
  let report_a = apply::apply(&store, &config, first, &LocalFetcher, None).await;
  assert!(report_a.error.is_none());
  let fp = build_ref.0;
  let mtime_a = std::fs::metadata(store.paths().complete_marker(&fp)).unwrap().modified().unwrap();

  let mut second = Registry::new();
  second.register_build(build());
  let report_b = apply::apply(&store, &config, second, &LocalFetcher, None).await;
  assert!(report_b.error.is_none());
  assert_ne!(report_a.snapshot_id, report_b.snapshot_id);

  let mtime_b = std::fs::metadata(store.paths().complete_marker(&fp)).unwrap().modified().unwrap();
  assert_eq!(mtime_a, mtime_b);
}

#[tokio::test]
async fn s3_update_path_invokes_update_not_destroy_create() {
  let store_dir = tempfile::tempdir().unwrap();
  let store = Store::open(store_dir.path());
  let config = Config::from_env();

  let work = tempfile::tempdir().unwrap();
  let target = work.path().join("versioned.txt");

  let versioned_bind = |version: &str| {
    let mut inputs = BTreeMap::new();
    inputs.insert("version".to_string(), InputEdge::Literal(Literal::String(version.to_string())));
    // Two steps: write the file (stdout redirected away), then `cat` it so
    // the program's last-step stdout — and thus the persisted `result`
    // output — reflects the file's actual content.
    BindSpec {
      id: "versioned-file".into(),
      inputs,
      create: vec![
        ActionStep::Exec {
          bin: "/bin/sh".into(),
          args: vec!["-c".into(), format!("printf 'Created {version}' > {}", target.display())],
          env: BTreeMap::new(),
          cwd: None,
        },
        ActionStep::Exec {
          bin: "/bin/cat".into(),
          args: vec![target.display().to_string()],
          env: BTreeMap::new(),
          cwd: None,
        },
      ],
      update: Some(vec![
        ActionStep::Exec {
          bin: "/bin/sh".into(),
          args: vec!["-c".into(), format!("printf 'Updated to {version}' > {}", target.display())],
          env: BTreeMap::new(),
          cwd: None,
        },
        ActionStep::Exec {
          bin: "/bin/cat".into(),
          args: vec![target.display().to_string()],
          env: BTreeMap::new(),
          cwd: None,
        },
      ]),
      destroy: Some(sh(&format!("rm -f {}", target.display()))),
      check: None,
    }
  };

  let mut first = Registry::new();
  first.register_bind(versioned_bind("1"));
  let report_a = apply::apply(&store, &config, first, &LocalFetcher, None).await;
  assert!(report_a.error.is_none());
  assert_eq!(std::fs::read_to_string(&target).unwrap(), "Created 1");

  let mut second = Registry::new();
  let bind_ref = second.register_bind(versioned_bind("2"));
  let report_b = apply::apply(&store, &config, second, &LocalFetcher, None).await;
  assert!(report_b.error.is_none());
  assert_eq!(std::fs::read_to_string(&target).unwrap(), "Updated to 2");

  let snapshots = warden_core::snapshot::SnapshotStore::new(&store);
  assert_eq!(snapshots.list().unwrap().len(), 2);

  let manifest = snapshots.load(&report_b.snapshot_id.unwrap()).unwrap();
  let record = manifest.binds.get(&bind_ref.0).unwrap();
  assert_eq!(record.outputs.get("result").map(String::as_str), Some("Updated to 2"));
}

#[tokio::test]
async fn s4_rollback_on_bind_failure_restores_original() {
  let store_dir = tempfile::tempdir().unwrap();
  let store = Store::open(store_dir.path());
  let config = Config::from_env();

  let work = tempfile::tempdir().unwrap();
  let original = work.path().join("original.txt");

  let original_bind = BindSpec {
    id: "original-bind".into(),
    inputs: BTreeMap::new(),
    create: sh(&format!("printf 'original\\n' > {}", original.display())),
    update: None,
    destroy: Some(sh(&format!("rm -f {}", original.display()))),
    check: None,
  };

  let mut first = Registry::new();
  first.register_bind(original_bind.clone());
  let report_a = apply::apply(&store, &config, first, &LocalFetcher, None).await;
  assert!(report_a.error.is_none());
  assert!(original.exists());

  // Second declaration drops `original-bind` (destroyed) and introduces a
  // bind whose create fails.
  let mut second = Registry::new();
  second.register_bind(BindSpec {
    id: "failing-bind".into(),
    inputs: BTreeMap::new(),
    create: vec![ActionStep::Exec {
      bin: "/bin/false".into(),
      args: vec![],
      env: BTreeMap::new(),
      cwd: None,
    }],
    update: None,
    destroy: None,
    check: None,
  });

  let report_b = apply::apply(&store, &config, second, &LocalFetcher, None).await;
  assert!(report_b.error.is_some());
  assert!(report_b.rollback.as_ref().unwrap().is_full_success());
  assert!(original.exists(), "rollback should have re-created original-bind");

  let snapshots = warden_core::snapshot::SnapshotStore::new(&store);
  assert_eq!(snapshots.current().unwrap(), report_a.snapshot_id);
}

#[tokio::test]
async fn s5_build_failure_skips_dependent_bind() {
  let store_dir = tempfile::tempdir().unwrap();
  let store = Store::open(store_dir.path());
  let config = Config::from_env();

  let work = tempfile::tempdir().unwrap();
  let marker = work.path().join("should-not-exist.txt");

  let mut registry = Registry::new();
  let failing_build = registry.register_build(BuildSpec {
    id: Some("failing-build".into()),
    inputs: BTreeMap::new(),
    create: vec![ActionStep::Exec {
      bin: "/bin/false".into(),
      args: vec![],
      env: BTreeMap::new(),
      cwd: None,
    }],
    outputs: None,
  });

  let mut inputs = BTreeMap::new();
  inputs.insert("build".to_string(), InputEdge::Build(failing_build));
  registry.register_bind(BindSpec {
    id: "depends-on-failing-build".into(),
    inputs,
    create: sh(&format!("printf 'should not run' > {}", marker.display())),
    update: None,
    destroy: None,
    check: None,
  });

  let report = apply::apply(&store, &config, registry, &LocalFetcher, None).await;
  assert!(report.error.is_some());
  assert!(!marker.exists());
}

#[tokio::test]
async fn s6_drift_check_reports_and_reapply_recreates() {
  let store_dir = tempfile::tempdir().unwrap();
  let store = Store::open(store_dir.path());
  let config = Config::from_env();

  let work = tempfile::tempdir().unwrap();
  let marker = work.path().join("check-marker.txt");

  let drifting_bind = || BindSpec {
    id: "drift-bind".into(),
    inputs: BTreeMap::new(),
    create: sh(&format!("printf 'present\\n' > {}", marker.display())),
    update: None,
    destroy: Some(sh(&format!("rm -f {}", marker.display()))),
    check: Some(sh(&format!(
      "if [ -f {0} ]; then printf ''; else printf 'file does not exist'; fi",
      marker.display()
    ))),
  };

  let mut registry = Registry::new();
  let bind_ref = registry.register_bind(drifting_bind());
  apply::apply(&store, &config, registry, &LocalFetcher, None).await;
  assert!(marker.exists());

  std::fs::remove_file(&marker).unwrap();

  let node = warden_core::bind::BindNode {
    fingerprint: bind_ref.0,
    spec: drifting_bind(),
  };
  let check_dir = tempfile::tempdir().unwrap();
  let drift = check(&node, &BTreeMap::new(), check_dir.path(), &LocalFetcher).await.unwrap();
  assert!(drift.drifted);
  assert_eq!(drift.message.as_deref(), Some("file does not exist"));

  // `check` never triggers a re-apply by itself (§9) — only an explicit
  // apply recreates a drifted bind, and only once its lifecycle actually
  // runs `create` again (here via a destroy/apply cycle).
  apply::destroy(&store, &LocalFetcher).await.unwrap();
  let mut reapply = Registry::new();
  reapply.register_bind(drifting_bind());
  apply::apply(&store, &config, reapply, &LocalFetcher, None).await;
  assert!(marker.exists());
}
