//! Implementation of the `warden rollback` command.
//!
//! Distinct from the automatic rollback coordinator (C8, invoked internally
//! by `warden apply` on mid-apply failure): this is a user-triggered
//! restore to an arbitrary prior snapshot, driven through the same
//! apply/plan/diff machinery — reconstructing a [`Registry`] from the
//! target manifest's recorded specs and re-running `apply` against it is
//! exactly what reconciles the host back to that state.

use anyhow::{Context, Result};
use warden_core::config::Config;
use warden_core::eval::Registry;
use warden_core::fetch::LocalFetcher;
use warden_core::snapshot::SnapshotStore;
use warden_core::store::Store;

use crate::output::{print_success, truncate_hash};
use crate::prompts::confirm;

pub async fn cmd_rollback(config: &Config, id: Option<String>, force: bool) -> Result<warden_core::apply::ApplyReport> {
  let store = Store::open(&config.store_root);
  let snapshots = SnapshotStore::new(&store);

  let target_id = match id {
    Some(id) => warden_core::fingerprint::Fingerprint::from_hex(&id).with_context(|| format!("'{id}' is not a valid snapshot id"))?,
    None => {
      let index = snapshots.list()?;
      let current = snapshots.current()?;
      let current_pos = current.and_then(|cur| index.iter().position(|m| m.id == cur));
      let target = match current_pos {
        Some(0) | None => anyhow::bail!("no prior snapshot to roll back to"),
        Some(pos) => index[pos - 1].id,
      };
      target
    }
  };

  if !confirm(&format!("Roll back to snapshot {}?", truncate_hash(&target_id.to_hex())), force)? {
    println!("Aborted.");
    return Ok(warden_core::apply::ApplyReport {
      snapshot_id: None,
      error: None,
      rollback: None,
    });
  }

  let manifest = snapshots.load(&target_id)?;

  let mut registry = Registry::new();
  for record in manifest.builds.values() {
    registry.register_build(record.spec.clone());
  }
  for record in manifest.binds.values() {
    registry.register_bind(record.spec.clone());
  }

  let report = warden_core::apply::apply(&store, config, registry, &LocalFetcher, None).await;
  if report.error.is_none() {
    print_success(&format!("rolled back to snapshot {}", truncate_hash(&target_id.to_hex())));
  }
  Ok(report)
}
