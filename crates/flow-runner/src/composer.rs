//! Shared step construction for the serial and parallel composers.
//!
//! For each declared child the composer resolves the target executable,
//! computes the child env and argv, propagates the composite's working
//! directory, and wraps dispatch in a step function plus an optional
//! store-reading condition closure.

use std::collections::HashMap;
use std::sync::Arc;

use flow_context::ExecutionContext;
use flow_engine::{BoxError, ConditionFn, Engine, Step, StepFn};
use flow_env::args::{build_args_env_map, build_args_from_env};
use flow_env::{build_env_map, create_temp_env_files, default_env, DISABLE_INTERACTIVE_ENV};
use flow_types::{Directory, ExecEnvironment, Executable, StepConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, warn};

use crate::dispatch::{self, executable_for_cmd, executable_for_ref};
use crate::error::RunnerError;
use crate::expr;

pub(crate) struct ComposerOptions {
  /// The composite's declared dir; children with an unset dir inherit it.
  pub dir: Directory,
  /// Whether the composite itself declares arguments.
  pub parent_declares_args: bool,
  /// Parallel composites fold the live process env under the child env.
  pub merge_process_env: bool,
  /// Serial composites honor per-step review gates.
  pub honor_review: bool,
}

/// Resolve the composite's own env and materialize its output files.
pub(crate) fn prepare_env(
  ctx: &ExecutionContext,
  executable: &Executable,
  env_spec: &ExecEnvironment,
  input_env: &HashMap<String, String>,
  input_args: &[String],
) -> Result<HashMap<String, String>, RunnerError> {
  let defaults = default_env(ctx, executable);
  let env_map = build_env_map(
    ctx.secrets.as_ref(),
    ctx.config.current_vault_name(),
    env_spec,
    input_args,
    input_env,
    &defaults,
  )
  .map_err(RunnerError::Env)?;

  create_temp_env_files(
    ctx,
    ctx.secrets.as_ref(),
    ctx.config.current_vault_name(),
    executable.flowfile_path(),
    executable.workspace_path(),
    env_spec,
    input_args,
    &env_map,
  )
  .map_err(RunnerError::Env)?;

  Ok(env_map)
}

/// Expand a composite's step configs into engine steps.
pub(crate) fn build_steps(
  ctx: &Arc<ExecutionContext>,
  parent: &Arc<Executable>,
  engine: &Arc<dyn Engine>,
  step_configs: &[StepConfig],
  base_env: &HashMap<String, String>,
  options: &ComposerOptions,
) -> Result<Vec<Step>, RunnerError> {
  let total = step_configs.len();
  let mut steps = Vec::with_capacity(total);

  for (index, config) in step_configs.iter().enumerate() {
    let mut child: Executable = match (config.exec_ref.is_empty(), config.cmd.is_empty()) {
      (false, true) => (*executable_for_ref(ctx, parent, &config.exec_ref)?).clone(),
      (true, false) => executable_for_cmd(parent, &config.cmd, index),
      _ => {
        return Err(RunnerError::validation(
          "composite step must have exactly one of ref or cmd",
        ));
      }
    };

    let mut child_env = base_env.clone();
    if options.merge_process_env {
      for (key, value) in std::env::vars() {
        child_env.entry(key).or_insert(value);
      }
    }

    let mut child_args: Vec<String> = Vec::new();
    if !config.args.is_empty() {
      let declared_args = child.env().map(|e| e.args.clone()).unwrap_or_default();
      if declared_args.is_empty() {
        warn!(
          executable = %child.reference(),
          "executable has no arguments defined, skipping argument processing"
        );
      } else {
        if options.parent_declares_args {
          child_args = build_args_from_env(&declared_args, &child_env);
          if child_args.is_empty() {
            // No env-carried values resolved; fall back to the verbatim argv.
            child_args = config.args.clone();
          }
        } else {
          child_args = config.args.clone();
        }

        let child_env_spec = child.env().cloned().unwrap_or_default();
        match build_args_env_map(&child_env_spec, &child_args, &child_env) {
          Ok(arg_env) => child_env.extend(arg_env),
          Err(e) => error!(error = %e, "unable to process arguments"),
        }
      }
    }

    let step_id = child.reference().to_string();
    apply_step_fields_and_dir(&mut child, &step_id, &options.dir);

    let function = build_function(
      ctx,
      engine,
      Arc::new(child),
      child_env,
      child_args,
      options.honor_review && config.review_required,
    );
    let condition = build_condition(ctx, parent, base_env, config, index + 1, total);

    steps.push(Step {
      id: step_id,
      function,
      condition,
      max_retries: config.retries,
    });
  }

  Ok(steps)
}

/// Attach the step label and propagate the composite's dir into children
/// that left theirs unset. The request kind only inherits the response
/// file's directory.
fn apply_step_fields_and_dir(child: &mut Executable, step_id: &str, dir: &Directory) {
  if let Some(spec) = child.exec.as_mut() {
    spec.set_log_fields(HashMap::from([("step".to_string(), step_id.to_string())]));
    if !dir.is_empty() && spec.dir.is_empty() {
      spec.dir = dir.clone();
    }
  } else if let Some(spec) = child.serial.as_mut() {
    if !dir.is_empty() && spec.dir.is_empty() {
      spec.dir = dir.clone();
    }
  } else if let Some(spec) = child.parallel.as_mut() {
    if !dir.is_empty() && spec.dir.is_empty() {
      spec.dir = dir.clone();
    }
  } else if let Some(spec) = child.render.as_mut() {
    if !dir.is_empty() && spec.dir.is_empty() {
      spec.dir = dir.clone();
    }
  } else if let Some(spec) = child.request.as_mut() {
    if let Some(response_file) = spec.response_file.as_mut() {
      if !dir.is_empty() && response_file.dir.is_empty() {
        response_file.dir = dir.clone();
      }
    }
  }
}

fn build_function(
  ctx: &Arc<ExecutionContext>,
  engine: &Arc<dyn Engine>,
  child: Arc<Executable>,
  child_env: HashMap<String, String>,
  child_args: Vec<String>,
  review_required: bool,
) -> StepFn {
  let ctx = ctx.clone();
  let engine = engine.clone();
  let interactive = ctx.config.interactive_enabled();

  Arc::new(move |cancel| {
    let ctx = ctx.clone();
    let engine = engine.clone();
    let child = child.clone();
    let env = child_env.clone();
    let args = child_args.clone();

    Box::pin(async move {
      if review_required {
        confirm_review(&child.reference().to_string(), interactive)
          .await
          .map_err(|e| Box::new(e) as BoxError)?;
      }
      dispatch::exec(ctx, child, engine, cancel, env, args)
        .await
        .map_err(|e| Box::new(e) as BoxError)
    })
  })
}

/// Build the `if:` gate closure.
///
/// The store is snapshotted inside the closure, at the moment the engine
/// considers the step, so serial gates observe earlier steps' writes.
fn build_condition(
  ctx: &Arc<ExecutionContext>,
  parent: &Arc<Executable>,
  base_env: &HashMap<String, String>,
  config: &StepConfig,
  step_num: usize,
  total: usize,
) -> Option<ConditionFn> {
  if config.condition.is_empty() {
    return None;
  }

  let expression = config.condition.clone();
  let ctx = ctx.clone();
  let parent = parent.clone();
  let env = base_env.clone();

  Some(Box::new(move || {
    let cache_data = ctx.store.snapshot().map_err(|e| Box::new(e) as BoxError)?;
    let data = expr::expression_data(&ctx, &parent, &cache_data, &env);
    let truthy = expr::is_truthy(&expression, &data).map_err(|e| Box::new(e) as BoxError)?;
    if truthy {
      debug!(condition = %expression, "condition is true");
    } else {
      debug!("skipping execution {step_num}/{total}");
    }
    Ok(truthy)
  }))
}

/// Block on an operator acknowledgement before a reviewed step runs.
async fn confirm_review(step: &str, interactive: bool) -> Result<(), RunnerError> {
  let disabled = std::env::var(DISABLE_INTERACTIVE_ENV)
    .map(|v| v == "true")
    .unwrap_or(false);
  if !interactive || disabled {
    return Err(RunnerError::validation(format!(
      "step '{step}' requires review but interactive mode is disabled"
    )));
  }

  eprintln!("review required for '{step}' - press enter to continue");
  let mut line = String::new();
  BufReader::new(tokio::io::stdin())
    .read_line(&mut line)
    .await?;
  Ok(())
}
