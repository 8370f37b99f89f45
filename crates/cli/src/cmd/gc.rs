//! Implementation of the `warden gc` command (C10).

use anyhow::Result;
use warden_core::config::Config;
use warden_core::gc;
use warden_core::store::Store;

use crate::output::{OutputFormat, format_bytes, print_info, print_json, print_stat, print_success};

pub fn cmd_gc(config: &Config, output: OutputFormat) -> Result<()> {
  let store = Store::open(&config.store_root);
  let result = gc::collect(&store)?;

  if output.is_json() {
    print_json(&serde_json::json!({
      "objects_deleted": result.stats.objects_deleted,
      "sources_deleted": result.stats.sources_deleted,
      "bytes_reclaimed": result.stats.bytes_reclaimed,
    }))?;
    return Ok(());
  }

  if result.stats.objects_deleted == 0 && result.stats.sources_deleted == 0 {
    print_info("nothing to collect");
  } else {
    print_success("garbage collection complete");
  }
  print_stat("Objects scanned", &result.stats.objects_scanned.to_string());
  print_stat("Objects deleted", &result.stats.objects_deleted.to_string());
  print_stat("Sources scanned", &result.stats.sources_scanned.to_string());
  print_stat("Sources deleted", &result.stats.sources_deleted.to_string());
  print_stat("Space reclaimed", &format_bytes(result.stats.bytes_reclaimed));
  Ok(())
}
