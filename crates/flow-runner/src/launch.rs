//! The launch runner: open a URI or file with the platform opener.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use flow_context::ExecutionContext;
use flow_engine::Engine;
use flow_env::{build_env_map, default_env};
use flow_types::directory::expand_vars;
use flow_types::Executable;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatch::Runner;
use crate::error::RunnerError;

pub struct LaunchRunner;

#[async_trait]
impl Runner for LaunchRunner {
  fn name(&self) -> &'static str {
    "launch"
  }

  fn is_compatible(&self, executable: &Executable) -> bool {
    executable.launch.is_some()
  }

  async fn exec(
    &self,
    ctx: Arc<ExecutionContext>,
    executable: Arc<Executable>,
    _engine: Arc<dyn Engine>,
    cancel: CancellationToken,
    input_env: HashMap<String, String>,
    input_args: Vec<String>,
  ) -> Result<(), RunnerError> {
    let spec = executable
      .launch
      .as_ref()
      .ok_or_else(|| RunnerError::validation("missing launch spec"))?;

    let defaults = default_env(&ctx, &executable);
    let env_map = build_env_map(
      ctx.secrets.as_ref(),
      ctx.config.current_vault_name(),
      &spec.env,
      &input_args,
      &input_env,
      &defaults,
    )
    .map_err(RunnerError::Env)?;

    let uri = expand_vars(&spec.uri, |key| env_map.get(key).cloned());
    if uri.is_empty() {
      return Err(RunnerError::validation("launch uri must be specified"));
    }

    let mut cmd = if spec.app.is_empty() {
      let mut cmd = Command::new(platform_opener());
      cmd.arg(&uri);
      cmd
    } else {
      let mut cmd = Command::new(&spec.app);
      cmd.arg(&uri);
      cmd
    };
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    if spec.wait {
      cmd.kill_on_drop(true);
    }

    info!(uri = %uri, "launching");
    if spec.wait {
      let status = tokio::select! {
        status = cmd.status() => status?,
        _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
      };
      if !status.success() {
        return Err(RunnerError::ExitStatus {
          code: status.code().unwrap_or(-1),
        });
      }
    } else {
      cmd.spawn()?;
    }
    Ok(())
  }
}

fn platform_opener() -> &'static str {
  if cfg!(target_os = "macos") {
    "open"
  } else if cfg!(target_os = "windows") {
    "explorer"
  } else {
    "xdg-open"
  }
}
