//! Sandbox exec (C9).
//!
//! `ActionCtx` is the only way an [`crate::eval::ActionStep`] can touch the
//! host: spawn a process, or run a small script through a named interpreter.
//! Environment is constrained by default (§4.9) — no shell is implicit for
//! `exec`, and the child inherits nothing beyond stdio.
//!
//! Grounded in the teacher's `execute::actions::cmd::execute_cmd`: clear the
//! environment, set a minimal deterministic one, merge in the caller's `env`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::eval::ScriptKind;

const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum SandboxError {
  #[error("exec failed: {bin} exited with {status:?}\n{stderr_tail}")]
  ExecFailed {
    bin: String,
    status: Option<i32>,
    stderr_tail: String,
  },
  #[error("exec timed out after {0:?}")]
  ExecTimeout(Duration),
  #[error("no interpreter available for {0:?} on this host")]
  NoInterpreter(ScriptKind),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// One process-spawn request.
#[derive(Debug, Clone)]
pub struct ExecSpec {
  pub bin: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub cwd: Option<PathBuf>,
  pub deadline: Option<Duration>,
}

/// The capability surface handed to an [`crate::eval::ActionProgram`]
/// interpreter. `out` is only meaningful for builds; bind phases get a
/// process-private temp dir instead (§4.9).
pub struct ActionCtx {
  pub out: PathBuf,
}

impl ActionCtx {
  pub fn new(out: PathBuf) -> Self {
    Self { out }
  }

  /// Spawn `spec.bin` directly — no implicit shell. The child's environment
  /// is exactly `spec.env` (plus a minimal deterministic baseline); nothing
  /// from the calling process's environment is inherited on POSIX.
  pub async fn exec(&self, spec: ExecSpec) -> Result<String, SandboxError> {
    info!(bin = %spec.bin, "executing command");

    let mut command = Command::new(&spec.bin);
    command
      .args(&spec.args)
      .current_dir(spec.cwd.as_deref().unwrap_or(&self.out))
      .env_clear()
      .env("PATH", minimal_path())
      .env("HOME", "/homeless-shelter")
      .env("out", &self.out)
      .env("LANG", "C")
      .env("LC_ALL", "C");

    for (k, v) in &spec.env {
      command.env(k, v);
    }

    run(command, &spec.bin, spec.deadline).await
  }

  /// Write `body` to a temp file and invoke the interpreter selected by
  /// `(kind, host os)`, centralizing the cross-platform shell diversity
  /// noted in the Design Notes: callers request a `ScriptKind`, never a raw
  /// shell path.
  pub async fn script(&self, kind: ScriptKind, body: &str, name: Option<&str>) -> Result<String, SandboxError> {
    let file_name = name.map(str::to_string).unwrap_or_else(|| "script".to_string());
    let script_path = self.out.join(format!(".{file_name}.tmp"));
    std::fs::write(&script_path, body)?;

    let (bin, mut args) = interpreter_for(kind)?;
    args.push(script_path.to_string_lossy().to_string());

    let mut command = Command::new(&bin);
    command
      .args(&args)
      .current_dir(&self.out)
      .env_clear()
      .env("PATH", minimal_path())
      .env("HOME", "/homeless-shelter")
      .env("out", &self.out);

    let result = run(command, &bin, None).await;
    let _ = std::fs::remove_file(&script_path);
    result
  }
}

fn minimal_path() -> &'static str {
  if cfg!(windows) { "C:\\Windows\\System32" } else { "/usr/bin:/bin" }
}

fn interpreter_for(kind: ScriptKind) -> Result<(String, Vec<String>), SandboxError> {
  match (kind, cfg!(windows)) {
    (ScriptKind::Shell, false) => Ok(("/bin/sh".into(), vec![])),
    (ScriptKind::Shell, true) => Ok(("powershell".into(), vec!["-NoProfile".into(), "-File".into()])),
    (ScriptKind::Cmd, _) => Ok(("cmd.exe".into(), vec!["/c".into()])),
    (ScriptKind::Bash, _) => which("bash")
      .map(|bin| (bin, vec![]))
      .ok_or(SandboxError::NoInterpreter(kind)),
  }
}

fn which(bin: &str) -> Option<String> {
  let path = std::env::var_os("PATH")?;
  std::env::split_paths(&path)
    .map(|p| p.join(bin))
    .find(|p| p.is_file())
    .map(|p| p.to_string_lossy().to_string())
}

async fn run(mut command: Command, bin: &str, deadline: Option<Duration>) -> Result<String, SandboxError> {
  debug!(bin = %bin, "spawning process");

  // Without this, dropping `output_fut` on timeout below leaves the child
  // running — tokio only reaps it on drop if told to kill it first.
  command.kill_on_drop(true);

  let output_fut = command.output();
  let output = match deadline {
    Some(d) => tokio::time::timeout(d, output_fut)
      .await
      .map_err(|_| SandboxError::ExecTimeout(d))??,
    None => output_fut.await?,
  };

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: String = stderr.chars().rev().take(STDERR_TAIL_BYTES).collect::<Vec<_>>().into_iter().rev().collect();
    return Err(SandboxError::ExecFailed {
      bin: bin.to_string(),
      status: output.status.code(),
      stderr_tail: tail,
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// A process-private temp dir for a bind phase's `ActionCtx` (§4.9: "cwd
/// defaults to... a process-private temp dir for binds").
pub fn bind_ctx(existing: &Path) -> std::io::Result<ActionCtx> {
  Ok(ActionCtx::new(existing.to_path_buf()))
}
