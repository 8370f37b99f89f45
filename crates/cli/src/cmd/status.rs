//! Implementation of the `warden status` command.
//!
//! Shows the current snapshot's build/bind counts and runs each bind's
//! `check` phase to report drift. `check` never triggers a re-apply by
//! itself (§9 Open Question, resolved) — this command only reports.

use anyhow::Result;
use warden_core::bind::{BindNode, check};
use warden_core::config::Config;
use warden_core::fetch::LocalFetcher;
use warden_core::snapshot::SnapshotStore;
use warden_core::store::Store;

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, truncate_hash};

pub async fn cmd_status(config: &Config, output: OutputFormat) -> Result<()> {
  let store = Store::open(&config.store_root);
  let snapshots = SnapshotStore::new(&store);

  let Some(id) = snapshots.current()? else {
    if output.is_json() {
      print_json(&serde_json::json!({ "current": null }))?;
    } else {
      print_info("no current snapshot; run 'warden apply' to create one");
    }
    return Ok(());
  };

  let manifest = snapshots.load(&id)?;
  let mut drifted = Vec::new();

  for (fp, record) in &manifest.binds {
    let node = BindNode {
      fingerprint: *fp,
      spec: record.spec.clone(),
    };
    let work_dir = tempfile::tempdir()?;
    let report = check(&node, &record.outputs, work_dir.path(), &LocalFetcher).await?;
    if report.drifted {
      drifted.push((record.spec.id.clone(), report.message));
    }
  }

  if output.is_json() {
    print_json(&serde_json::json!({
      "current": id.to_hex(),
      "builds": manifest.builds.len(),
      "binds": manifest.binds.len(),
      "drifted": drifted.iter().map(|(id, msg)| serde_json::json!({"id": id, "message": msg})).collect::<Vec<_>>(),
    }))?;
  } else {
    print_success(&format!("current snapshot: {}", truncate_hash(&id.to_hex())));
    print_stat("Builds", &manifest.builds.len().to_string());
    print_stat("Binds", &manifest.binds.len().to_string());

    if drifted.is_empty() {
      print_info("no drift detected");
    } else {
      println!();
      println!("Drifted binds:");
      for (id, message) in &drifted {
        match message {
          Some(m) => println!("  - {id}: {m}"),
          None => println!("  - {id}"),
        }
      }
    }
  }

  Ok(())
}
