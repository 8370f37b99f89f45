//! Implementation of `warden snapshot {list,show,delete,tag,untag}` (§6).

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use warden_core::config::Config;
use warden_core::fingerprint::Fingerprint;
use warden_core::snapshot::SnapshotStore;
use warden_core::store::Store;
use tracing::info;

use crate::output::{OutputFormat, print_info, print_json, print_success, print_warning, truncate_hash};
use crate::prompts::confirm;

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
  /// List all snapshots, most recent last
  List {
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show one snapshot's manifest
  Show {
    id: String,
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Delete a snapshot (rejected for the current snapshot)
  Delete {
    id: String,
    #[arg(long)]
    force: bool,
  },

  /// Add tags to a snapshot
  Tag { id: String, tags: Vec<String> },

  /// Remove tags from a snapshot (removes all if none given)
  Untag { id: String, tags: Vec<String> },
}

fn parse_id(id: &str) -> Result<Fingerprint> {
  Fingerprint::from_hex(id).with_context(|| format!("'{id}' is not a valid snapshot id (expected hex digest)"))
}

pub fn cmd_snapshot(config: &Config, command: SnapshotCommand) -> Result<()> {
  let store = Store::open(&config.store_root);
  let snapshots = SnapshotStore::new(&store);

  match command {
    SnapshotCommand::List { output } => cmd_list(&snapshots, output),
    SnapshotCommand::Show { id, output } => cmd_show(&snapshots, &id, output),
    SnapshotCommand::Delete { id, force } => cmd_delete(&snapshots, &id, force),
    SnapshotCommand::Tag { id, tags } => cmd_tag(&snapshots, &id, tags),
    SnapshotCommand::Untag { id, tags } => cmd_untag(&snapshots, &id, tags),
  }
}

#[derive(Serialize)]
struct ListItem {
  id: String,
  is_current: bool,
  created_at_unix: u64,
  build_count: usize,
  bind_count: usize,
  tags: Vec<String>,
}

fn cmd_list(snapshots: &SnapshotStore, output: OutputFormat) -> Result<()> {
  let current = snapshots.current()?;
  let entries = snapshots.list()?;

  if output.is_json() {
    let items: Vec<_> = entries
      .iter()
      .map(|m| ListItem {
        id: m.id.to_hex(),
        is_current: current == Some(m.id),
        created_at_unix: m.created_at_unix,
        build_count: m.build_count,
        bind_count: m.bind_count,
        tags: m.tags.clone(),
      })
      .collect();
    print_json(&items)?;
    return Ok(());
  }

  if entries.is_empty() {
    print_info("no snapshots found");
    return Ok(());
  }

  for meta in &entries {
    let marker = if current == Some(meta.id) { " (current)" } else { "" };
    let tags_str = if meta.tags.is_empty() { String::new() } else { format!(" [{}]", meta.tags.join(", ")) };
    println!(
      "{}{}{} - builds={} binds={}",
      truncate_hash(&meta.id.to_hex()),
      marker,
      tags_str,
      meta.build_count,
      meta.bind_count
    );
  }
  Ok(())
}

fn cmd_show(snapshots: &SnapshotStore, id: &str, output: OutputFormat) -> Result<()> {
  let fp = parse_id(id)?;
  let manifest = snapshots.load(&fp)?;
  let is_current = snapshots.current()? == Some(fp);
  let tags = snapshots.list()?.into_iter().find(|m| m.id == fp).map(|m| m.tags).unwrap_or_default();

  if output.is_json() {
    print_json(&manifest)?;
    return Ok(());
  }

  let marker = if is_current { " (current)" } else { "" };
  let tags_str = if tags.is_empty() { String::new() } else { format!(" [{}]", tags.join(", ")) };
  println!("Snapshot: {}{}{}", truncate_hash(id), marker, tags_str);
  println!("Builds:   {}", manifest.builds.len());
  for (fp, record) in &manifest.builds {
    println!("  {} ({})", record.spec.id.as_deref().unwrap_or("(unnamed)"), truncate_hash(&fp.to_hex()));
  }
  println!("Binds:    {}", manifest.binds.len());
  for (fp, record) in &manifest.binds {
    println!("  {} ({})", record.spec.id, truncate_hash(&fp.to_hex()));
  }
  Ok(())
}

fn cmd_delete(snapshots: &SnapshotStore, id: &str, force: bool) -> Result<()> {
  let fp = parse_id(id)?;

  if snapshots.current()? == Some(fp) {
    print_warning("cannot delete the current snapshot; run 'warden destroy' or 'warden rollback' first");
    return Ok(());
  }

  if !confirm(&format!("Delete snapshot {}?", truncate_hash(id)), force)? {
    print_info("cancelled");
    return Ok(());
  }

  snapshots.delete(&fp)?;
  info!(id = %fp.short(), "deleted snapshot");
  print_success(&format!("deleted snapshot {}", truncate_hash(id)));
  Ok(())
}

fn cmd_tag(snapshots: &SnapshotStore, id: &str, tags: Vec<String>) -> Result<()> {
  let fp = parse_id(id)?;
  let mut current = snapshots.list()?.into_iter().find(|m| m.id == fp).context("snapshot not found")?.tags;
  for tag in tags {
    if !current.contains(&tag) {
      current.push(tag);
    }
  }
  snapshots.update_tags(&fp, current)?;
  print_success("tags updated");
  Ok(())
}

fn cmd_untag(snapshots: &SnapshotStore, id: &str, tags: Vec<String>) -> Result<()> {
  let fp = parse_id(id)?;
  let existing = snapshots.list()?.into_iter().find(|m| m.id == fp).context("snapshot not found")?.tags;

  // Omitting tag names clears all tags; naming specific ones removes just those.
  let remaining = if tags.is_empty() {
    Vec::new()
  } else {
    existing.into_iter().filter(|t| !tags.contains(t)).collect()
  };

  snapshots.update_tags(&fp, remaining)?;
  print_success("tags updated");
  Ok(())
}
