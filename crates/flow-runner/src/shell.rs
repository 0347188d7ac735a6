//! Shell command execution.
//!
//! Commands run under `sh -c` with the resolved env layered over the system
//! environment. Stdout and stderr stream line-by-line to the log sink; in
//! text mode lines pass through raw, in structured modes they become log
//! events with the step's fields attached. Cancellation of the outer context
//! kills the child process.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use flow_types::LogMode;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RunnerError;

/// Run an inline shell program in the given directory.
pub async fn run_cmd(
  command: &str,
  dir: &Path,
  env_list: &[(String, String)],
  log_mode: LogMode,
  cancel: CancellationToken,
  log_fields: &HashMap<String, String>,
) -> Result<(), RunnerError> {
  debug!(dir = %dir.display(), "running command:\n{}", command.trim());

  let mut cmd = Command::new("sh");
  cmd.arg("-c").arg(command.trim()).current_dir(dir);
  run_shell(cmd, env_list, log_mode, cancel, log_fields).await
}

/// Run a shell file in the given directory.
pub async fn run_file(
  filename: &str,
  dir: &Path,
  env_list: &[(String, String)],
  log_mode: LogMode,
  cancel: CancellationToken,
  log_fields: &HashMap<String, String>,
) -> Result<(), RunnerError> {
  let full_path = dir.join(filename);
  debug!(file = %full_path.display(), "executing file");
  if !full_path.is_file() {
    return Err(RunnerError::validation(format!(
      "file does not exist - {}",
      full_path.display()
    )));
  }

  let mut cmd = Command::new("sh");
  cmd.arg(full_path).current_dir(dir);
  run_shell(cmd, env_list, log_mode, cancel, log_fields).await
}

async fn run_shell(
  mut cmd: Command,
  env_list: &[(String, String)],
  log_mode: LogMode,
  cancel: CancellationToken,
  log_fields: &HashMap<String, String>,
) -> Result<(), RunnerError> {
  cmd
    .envs(env_list.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    .stdin(Stdio::inherit())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  let mut child = cmd.spawn()?;

  let stdout = child.stdout.take();
  let stderr = child.stderr.take();
  let out_task = spawn_line_forwarder(stdout, "stdout", log_mode, log_fields.clone());
  let err_task = spawn_line_forwarder(stderr, "stderr", log_mode, log_fields.clone());

  let status = tokio::select! {
    status = child.wait() => status?,
    _ = cancel.cancelled() => {
      if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill child process on cancellation");
      }
      return Err(RunnerError::Cancelled);
    }
  };

  // Drain remaining output before reporting the exit status.
  if let Some(task) = out_task {
    let _ = task.await;
  }
  if let Some(task) = err_task {
    let _ = task.await;
  }

  if status.success() {
    Ok(())
  } else {
    Err(RunnerError::ExitStatus {
      code: status.code().unwrap_or(-1),
    })
  }
}

fn spawn_line_forwarder<R>(
  reader: Option<R>,
  stream: &'static str,
  log_mode: LogMode,
  log_fields: HashMap<String, String>,
) -> Option<tokio::task::JoinHandle<()>>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  let reader = reader?;
  Some(tokio::spawn(async move {
    let mut lines = BufReader::new(reader).lines();
    let fields = joined_fields(&log_fields);
    while let Ok(Some(line)) = lines.next_line().await {
      forward_line(stream, log_mode, &fields, &line);
    }
  }))
}

fn forward_line(stream: &'static str, log_mode: LogMode, fields: &str, line: &str) {
  match log_mode {
    LogMode::Text => {
      if stream == "stderr" {
        eprintln!("{line}");
      } else {
        println!("{line}");
      }
    }
    LogMode::Json | LogMode::Logfmt => {
      if fields.is_empty() {
        info!(stream, "{line}");
      } else {
        info!(stream, fields, "{line}");
      }
    }
  }
}

fn joined_fields(log_fields: &HashMap<String, String>) -> String {
  let mut pairs: Vec<String> = log_fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
  pairs.sort();
  pairs.join(",")
}

/// Normalize the color-related environment once at startup.
///
/// Without an explicit preference: CI and test runs force colors off,
/// interactive runs force them on. `TERM` gets a sane default when colors
/// are enabled.
pub fn setup_color_environment() {
  let has_preference = ["NO_COLOR", "FORCE_COLOR", "CLICOLOR_FORCE"]
    .iter()
    .any(|key| std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false));

  if !has_preference {
    let is_ci = ["CI", "GITHUB_ACTIONS"]
      .iter()
      .any(|key| std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false));
    let is_testing = std::env::args()
      .next()
      .map(|arg0| arg0.ends_with("test"))
      .unwrap_or(false);

    if is_ci || is_testing {
      std::env::set_var("NO_COLOR", "1");
    } else {
      std::env::set_var("FORCE_COLOR", "1");
      std::env::set_var("CLICOLOR_FORCE", "1");
    }
  }

  if std::env::var("NO_COLOR").unwrap_or_default().is_empty()
    && std::env::var("TERM").unwrap_or_default().is_empty()
  {
    std::env::set_var("TERM", "xterm-256color");
  }
}
