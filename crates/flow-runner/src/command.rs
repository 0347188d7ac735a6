//! The command (exec) runner.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flow_context::ExecutionContext;
use flow_engine::Engine;
use flow_env::{build_env_map, create_temp_env_files, default_env, env_map_to_list};
use flow_types::Executable;
use tokio_util::sync::CancellationToken;

use crate::dispatch::Runner;
use crate::error::RunnerError;
use crate::shell;

pub struct CommandRunner;

#[async_trait]
impl Runner for CommandRunner {
  fn name(&self) -> &'static str {
    "exec"
  }

  fn is_compatible(&self, executable: &Executable) -> bool {
    executable.exec.is_some()
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
      .exec
      .as_ref()
      .ok_or_else(|| RunnerError::validation("missing command spec"))?;

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

    create_temp_env_files(
      &ctx,
      ctx.secrets.as_ref(),
      ctx.config.current_vault_name(),
      executable.flowfile_path(),
      executable.workspace_path(),
      &spec.env,
      &input_args,
      &env_map,
    )
    .map_err(RunnerError::Env)?;

    let (target_dir, tmp_root) = spec.dir.expand(
      executable.workspace_path(),
      executable.flowfile_path(),
      ctx.process_tmp_dir().as_deref(),
      &env_map,
    )?;
    if let Some(root) = tmp_root {
      ctx.set_process_tmp_dir(root);
    }

    let env_list = env_map_to_list(&env_map);
    let log_mode = spec.log_mode.unwrap_or_else(|| ctx.config.default_log_mode());

    match (spec.cmd.is_empty(), spec.file.is_empty()) {
      (true, true) => Err(RunnerError::validation(
        "either cmd or file must be specified",
      )),
      (false, false) => Err(RunnerError::validation("cannot set both cmd and file")),
      (false, true) => {
        shell::run_cmd(
          &spec.cmd,
          &target_dir,
          &env_list,
          log_mode,
          cancel,
          &spec.log_fields,
        )
        .await
      }
      (true, false) => {
        shell::run_file(
          &spec.file,
          &target_dir,
          &env_list,
          log_mode,
          cancel,
          &spec.log_fields,
        )
        .await
      }
    }
  }
}
