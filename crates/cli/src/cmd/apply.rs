//! Implementation of the `warden apply` command.
//!
//! Evaluates a declaration file (§ the CLI's own JSON format, see
//! [`crate::declaration`]) and applies the resulting registry: realizes
//! added builds, walks binds in plan order, and — on success — advances the
//! current snapshot pointer. On failure the rollback coordinator has
//! already run by the time this returns; the report carries its outcome.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use warden_core::apply::ApplyReport;
use warden_core::config::Config;
use warden_core::fetch::LocalFetcher;
use warden_core::store::Store;

use crate::declaration::load_registry;
use crate::output::{OutputFormat, print_json, print_success, symbols, truncate_hash};

pub async fn cmd_apply(config: &Config, path: &Path, output: OutputFormat) -> Result<ApplyReport> {
  let registry = load_registry(path).with_context(|| format!("failed to load declaration {}", path.display()))?;
  let store = Store::open(&config.store_root);

  let report = warden_core::apply::apply(&store, config, registry, &LocalFetcher, Some(path.display().to_string())).await;

  if output.is_json() {
    print_json(&serde_json::json!({
      "snapshot_id": report.snapshot_id.map(|id| id.to_hex()),
      "error": report.error.as_ref().map(|e| e.to_string()),
      "rollback": report.rollback.as_ref().map(|r| serde_json::json!({
        "ok": r.is_full_success(),
        "failures": r.failures().len(),
      })),
    }))?;
  } else if let Some(ref error) = report.error {
    if let Some(ref rollback) = report.rollback {
      if rollback.is_full_success() {
        println!("{} apply failed, rolled back to the prior snapshot: {}", symbols::ERROR.red(), error);
      } else {
        println!(
          "{} apply failed and rollback only partially succeeded ({} of {} step(s) failed): {}",
          symbols::ERROR.red(),
          rollback.failures().len(),
          rollback.outcomes.len(),
          error
        );
      }
    } else {
      println!("{} apply failed before any effect was committed: {}", symbols::ERROR.red(), error);
    }
  } else if let Some(id) = report.snapshot_id {
    print_success(&format!("apply complete, snapshot {}", truncate_hash(&id.to_hex())));
  }

  Ok(report)
}
