//! `warden`: command-line interface for warden-core.
//!
//! Provides the `warden` command with subcommands:
//! - `warden apply <path>` - realize and apply a declaration file
//! - `warden destroy` - tear down everything the current snapshot manages
//! - `warden status` - report drift against the current snapshot
//! - `warden diff <path>` - preview a declaration's effect without applying
//! - `warden rollback [id]` - restore a prior snapshot
//! - `warden snapshot {list,show,delete,tag,untag}` - inspect snapshot history
//! - `warden gc` - reclaim unreferenced store objects and sources

mod cmd;
mod declaration;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use warden_core::config::Config;

use cmd::SnapshotCommand;
use output::{OutputFormat, print_error};

#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about = "Content-addressed builds and stateful host reconciliation")]
struct Cli {
  /// Increase log verbosity (repeatable: -v, -vv, -vvv)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  /// Override the store root (defaults to $SYS_STORE or the platform data dir)
  #[arg(long, global = true)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate a declaration file and apply it
  Apply {
    path: PathBuf,
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Tear down every bind the current snapshot manages
  Destroy {
    #[arg(long)]
    force: bool,
  },

  /// Report drift between the host and the current snapshot
  Status {
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Preview a declaration's effect without applying it
  Diff {
    path: PathBuf,
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Restore a prior snapshot (defaults to the one before current)
  Rollback {
    id: Option<String>,
    #[arg(long)]
    force: bool,
  },

  /// Inspect and manage snapshot history
  Snapshot {
    #[command(subcommand)]
    command: SnapshotCommand,
  },

  /// Reclaim store objects and sources unreferenced by any snapshot
  Gc {
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let mut config = Config::from_env();
  if let Some(store) = cli.store {
    config.store_root = store;
  }

  let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
    Ok(rt) => rt,
    Err(e) => {
      print_error(&format!("failed to start async runtime: {e}"));
      return ExitCode::from(3);
    }
  };

  runtime.block_on(run(&config, cli.command))
}

fn init_tracing(verbosity: u8) {
  let default_level = match verbosity {
    0 => "warden=info",
    1 => "warden=debug,warden_core=debug",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt().with_env_filter(filter).with_target(false).without_time().init();
}

async fn run(config: &Config, command: Commands) -> ExitCode {
  match command {
    Commands::Apply { path, output } => match cmd::cmd_apply(config, &path, output).await {
      Ok(report) => ExitCode::from(report.exit_code() as u8),
      Err(e) => fail(e),
    },
    Commands::Destroy { force } => match cmd::cmd_destroy(config, force).await {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => fail(e),
    },
    Commands::Status { output } => match cmd::cmd_status(config, output).await {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => fail(e),
    },
    Commands::Diff { path, output } => match cmd::cmd_diff(config, &path, output) {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => fail(e),
    },
    Commands::Rollback { id, force } => match cmd::cmd_rollback(config, id, force).await {
      Ok(report) => ExitCode::from(report.exit_code() as u8),
      Err(e) => fail(e),
    },
    Commands::Snapshot { command } => match cmd::cmd_snapshot(config, command) {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => fail(e),
    },
    Commands::Gc { output } => match cmd::cmd_gc(config, output) {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => fail(e),
    },
  }
}

/// §7 exit codes: user/IO errors surfaced through `anyhow` map to 3, except
/// lock contention and gc_busy (downcast from `warden_core::Error::kind()`),
/// which map to 4.
fn fail(err: anyhow::Error) -> ExitCode {
  let code = match err.downcast_ref::<warden_core::Error>() {
    Some(e) if matches!(e.kind(), "lock_contention" | "gc_busy") => 4,
    _ => 3,
  };
  print_error(&format!("{err:#}"));
  ExitCode::from(code)
}
