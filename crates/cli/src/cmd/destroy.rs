//! Implementation of the `warden destroy` command.
//!
//! Tears down every bind in the current snapshot, in reverse topological
//! order, then clears the current pointer. Builds are left in the store;
//! `warden gc` reclaims them once unreferenced.

use anyhow::Result;
use warden_core::config::Config;
use warden_core::fetch::LocalFetcher;
use warden_core::store::Store;

use crate::output::print_success;
use crate::prompts::confirm;

pub async fn cmd_destroy(config: &Config, force: bool) -> Result<()> {
  if !confirm("Destroy all binds managed by the current snapshot?", force)? {
    println!("Aborted.");
    return Ok(());
  }

  let store = Store::open(&config.store_root);
  warden_core::apply::destroy(&store, &LocalFetcher).await?;
  print_success("destroy complete");
  Ok(())
}
