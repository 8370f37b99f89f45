//! Implementation of the `warden diff` command.
//!
//! Evaluates a declaration file against the current snapshot and prints the
//! resulting build/bind diff without applying anything.

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use warden_core::config::Config;
use warden_core::plan::{BindTransition, BuildTransition, Plan};
use warden_core::snapshot::SnapshotStore;
use warden_core::store::Store;

use crate::declaration::load_registry;
use crate::output::{OutputFormat, print_json, symbols};

pub fn cmd_diff(config: &Config, path: &Path, output: OutputFormat) -> Result<()> {
  let registry = load_registry(path)?;
  let store = Store::open(&config.store_root);
  let snapshots = SnapshotStore::new(&store);
  let prior = snapshots.current_manifest()?;

  let plan = Plan::build(registry, &prior)?;

  if output.is_json() {
    let builds: Vec<_> = plan
      .build_diff
      .iter()
      .map(|e| serde_json::json!({"fingerprint": e.fingerprint.to_hex(), "transition": format!("{:?}", e.transition)}))
      .collect();
    let binds: Vec<_> = plan
      .bind_diff
      .iter()
      .map(|e| serde_json::json!({"id": e.id, "fingerprint": e.fingerprint.to_hex(), "transition": format!("{:?}", e.transition)}))
      .collect();
    print_json(&serde_json::json!({"builds": builds, "binds": binds}))?;
    return Ok(());
  }

  let added_builds = plan.build_diff.iter().filter(|e| e.transition == BuildTransition::Added).count();
  let removed_builds = plan.build_diff.iter().filter(|e| e.transition == BuildTransition::Removed).count();

  println!("Builds:");
  if added_builds == 0 && removed_builds == 0 {
    println!("  (no changes)");
  } else {
    if added_builds > 0 {
      println!("  {} {} added", symbols::PLUS.green(), added_builds);
    }
    if removed_builds > 0 {
      println!("  {} {} removed", symbols::MINUS.red(), removed_builds);
    }
  }

  println!();
  println!("Binds:");
  if plan.bind_diff.iter().all(|e| e.transition == BindTransition::Unchanged) {
    println!("  (no changes)");
  } else {
    for entry in &plan.bind_diff {
      match &entry.transition {
        BindTransition::Added => println!("  {} {}", symbols::PLUS.green(), entry.id),
        BindTransition::Removed { .. } => println!("  {} {}", symbols::MINUS.red(), entry.id),
        BindTransition::Update { .. } => println!("  {} {} (in-place update)", symbols::TILDE.yellow(), entry.id),
        BindTransition::Replace { .. } => println!("  {} {} (destroy + create)", symbols::TILDE.yellow(), entry.id),
        BindTransition::Unchanged => {}
      }
    }
  }

  Ok(())
}
