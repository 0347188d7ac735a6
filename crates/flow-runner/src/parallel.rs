//! The parallel composer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flow_context::ExecutionContext;
use flow_engine::{Engine, ExecuteOptions};
use flow_types::Executable;
use tokio_util::sync::CancellationToken;

use crate::composer::{build_steps, prepare_env, ComposerOptions};
use crate::dispatch::Runner;
use crate::error::RunnerError;

pub struct ParallelRunner;

#[async_trait]
impl Runner for ParallelRunner {
  fn name(&self) -> &'static str {
    "parallel"
  }

  fn is_compatible(&self, executable: &Executable) -> bool {
    executable.parallel.is_some()
  }

  async fn exec(
    &self,
    ctx: Arc<ExecutionContext>,
    executable: Arc<Executable>,
    engine: Arc<dyn Engine>,
    cancel: CancellationToken,
    input_env: HashMap<String, String>,
    input_args: Vec<String>,
  ) -> Result<(), RunnerError> {
    let spec = executable
      .parallel
      .as_ref()
      .ok_or_else(|| RunnerError::validation("missing parallel spec"))?;
    if spec.execs.is_empty() {
      return Err(RunnerError::validation("no parallel executables to run"));
    }

    let env_map = prepare_env(&ctx, &executable, &spec.env, &input_env, &input_args)?;

    if !spec.dir.is_empty() {
      let (_, tmp_root) = spec.dir.expand(
        executable.workspace_path(),
        executable.flowfile_path(),
        ctx.process_tmp_dir().as_deref(),
        &env_map,
      )?;
      if let Some(root) = tmp_root {
        ctx.set_process_tmp_dir(root);
      }
    }

    let options = ComposerOptions {
      dir: spec.dir.clone(),
      parent_declares_args: !spec.env.args.is_empty(),
      merge_process_env: true,
      honor_review: false,
    };
    let steps = build_steps(&ctx, &executable, &engine, &spec.execs, &env_map, &options)?;

    let summary = engine
      .execute(
        cancel,
        steps,
        ExecuteOptions::parallel()
          .with_fail_fast(spec.fail_fast)
          .with_max_threads(spec.max_threads),
      )
      .await;

    if summary.has_errors() {
      return Err(RunnerError::StepsFailed {
        message: summary.error_message(),
      });
    }
    Ok(())
  }
}
