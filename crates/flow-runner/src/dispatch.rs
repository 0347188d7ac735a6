//! Runner registry and dispatch.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use flow_context::ExecutionContext;
use flow_engine::Engine;
use flow_types::{Executable, ExecutableRef};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RunnerError;

/// Env var overriding the default timeout for command executables.
pub const TIMEOUT_OVERRIDE_ENV: &str = "FLOW_EXEC_TIMEOUT";

/// A kind-specific executable runner.
#[async_trait]
pub trait Runner: Send + Sync {
  fn name(&self) -> &'static str;

  /// Whether this runner can execute the given executable.
  fn is_compatible(&self, executable: &Executable) -> bool;

  /// Execute the executable. `cancel` covers this run and its descendants;
  /// runners must stop their work best-effort when it fires.
  async fn exec(
    &self,
    ctx: Arc<ExecutionContext>,
    executable: Arc<Executable>,
    engine: Arc<dyn Engine>,
    cancel: CancellationToken,
    input_env: HashMap<String, String>,
    input_args: Vec<String>,
  ) -> Result<(), RunnerError>;
}

static REGISTERED_RUNNERS: LazyLock<RwLock<Vec<Arc<dyn Runner>>>> =
  LazyLock::new(|| RwLock::new(Vec::new()));

/// Append a runner to the process-wide ordered list.
///
/// Registrations must happen before any `exec` call.
pub fn register_runner(runner: Arc<dyn Runner>) {
  REGISTERED_RUNNERS
    .write()
    .unwrap_or_else(|e| e.into_inner())
    .push(runner);
}

/// Clear the registry; for tests.
pub fn reset() {
  REGISTERED_RUNNERS
    .write()
    .unwrap_or_else(|e| e.into_inner())
    .clear();
}

fn registered_runners() -> Vec<Arc<dyn Runner>> {
  REGISTERED_RUNNERS
    .read()
    .unwrap_or_else(|e| e.into_inner())
    .clone()
}

/// Dispatch an executable to the first compatible registered runner,
/// enforcing the per-executable timeout.
pub async fn exec(
  ctx: Arc<ExecutionContext>,
  executable: Arc<Executable>,
  engine: Arc<dyn Engine>,
  cancel: CancellationToken,
  input_env: HashMap<String, String>,
  input_args: Vec<String>,
) -> Result<(), RunnerError> {
  let runner = registered_runners()
    .into_iter()
    .find(|r| r.is_compatible(&executable))
    .ok_or_else(|| RunnerError::CompatibleRunnerNotFound {
      id: executable.id(),
    })?;

  ctx.set_root_executable(executable.clone());
  debug!(
    runner = runner.name(),
    kind = executable.kind_name(),
    executable = %executable.reference(),
    scope = %ctx.scope(),
    "dispatching executable"
  );

  match effective_timeout(&ctx, &executable) {
    None => {
      runner
        .exec(ctx, executable, engine, cancel, input_env, input_args)
        .await
    }
    Some(duration) => {
      // Cancel only this run's subtree on timeout, not the whole invocation.
      let scope = cancel.child_token();
      tokio::select! {
        result = runner.exec(ctx, executable, engine, scope.clone(), input_env, input_args) => result,
        _ = tokio::time::sleep(duration) => {
          scope.cancel();
          Err(RunnerError::Timeout { duration })
        }
      }
    }
  }
}

/// The timeout to race the runner against, if any.
///
/// Command executables without an explicit timeout fall back to the
/// `FLOW_EXEC_TIMEOUT` override and then the configured default.
fn effective_timeout(ctx: &ExecutionContext, executable: &Executable) -> Option<Duration> {
  if let Some(ms) = executable.timeout_ms {
    return Some(Duration::from_millis(ms));
  }
  if executable.exec.is_none() {
    return None;
  }
  if let Ok(val) = std::env::var(TIMEOUT_OVERRIDE_ENV) {
    if let Ok(ms) = val.parse::<u64>() {
      return Some(Duration::from_millis(ms));
    }
  }
  ctx.config.default_timeout_ms.map(Duration::from_millis)
}

/// Look up a fully-expanded reference, refreshing the cache once on a miss.
pub fn resolve_executable(
  ctx: &ExecutionContext,
  reference: &ExecutableRef,
) -> Result<Arc<Executable>, RunnerError> {
  match ctx.executables.get(reference) {
    Ok(executable) => Ok(executable),
    Err(e) if e.is_not_found() => {
      debug!(reference = %reference, "executable not found in cache, syncing cache");
      ctx.executables.refresh()?;
      Ok(ctx.executables.get(reference)?)
    }
    Err(e) => Err(e.into()),
  }
}

/// Resolve a step's `ref`, expanding empty or wildcard parts from the parent.
pub fn executable_for_ref(
  ctx: &ExecutionContext,
  parent: &Executable,
  ref_str: &str,
) -> Result<Arc<Executable>, RunnerError> {
  let reference: ExecutableRef = ref_str.parse()?;
  let expanded = reference.expanded(parent.workspace(), parent.namespace());
  resolve_executable(ctx, &expanded)
}

/// Synthesize an inline command executable for a step's `cmd`, bound to the
/// parent's workspace, namespace, and flowfile.
pub fn executable_for_cmd(parent: &Executable, cmd: &str, index: usize) -> Executable {
  let mut executable = Executable::default();
  executable.verb = flow_types::Verb::Exec;
  executable.name = format!("{}-{index}", parent.name);
  executable.visibility = Some(flow_types::Visibility::Internal);
  executable.exec = Some(flow_types::CommandSpec {
    cmd: cmd.to_string(),
    ..Default::default()
  });
  executable.set_context(
    parent.workspace(),
    parent.workspace_path(),
    parent.namespace(),
    parent.flowfile_path(),
  );
  executable
}

#[cfg(test)]
mod tests {
  use super::*;
  use flow_engine::ExecEngine;

  struct NeverCompatible;

  #[async_trait]
  impl Runner for NeverCompatible {
    fn name(&self) -> &'static str {
      "never"
    }

    fn is_compatible(&self, _executable: &Executable) -> bool {
      false
    }

    async fn exec(
      &self,
      _ctx: Arc<ExecutionContext>,
      _executable: Arc<Executable>,
      _engine: Arc<dyn Engine>,
      _cancel: CancellationToken,
      _input_env: HashMap<String, String>,
      _input_args: Vec<String>,
    ) -> Result<(), RunnerError> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn incompatible_executable_is_rejected() {
    reset();
    register_runner(Arc::new(NeverCompatible));

    let ctx = ExecutionContext::builder().build();
    let mut executable = Executable::default();
    executable.name = "orphan".to_string();
    let executable = Arc::new(executable);
    let engine: Arc<dyn Engine> = Arc::new(ExecEngine::new());

    let err = exec(
      ctx,
      executable,
      engine,
      CancellationToken::new(),
      HashMap::new(),
      Vec::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RunnerError::CompatibleRunnerNotFound { .. }));
    reset();
  }

  #[test]
  fn synthesized_cmd_inherits_parent_context() {
    let mut parent = Executable::default();
    parent.name = "pipeline".to_string();
    parent.set_context("ws", "/ws", "ns", "/ws/pipeline.flow");

    let child = executable_for_cmd(&parent, "echo hi", 2);
    assert_eq!(child.name, "pipeline-2");
    assert_eq!(child.workspace(), "ws");
    assert_eq!(child.namespace(), "ns");
    assert_eq!(child.exec.as_ref().unwrap().cmd, "echo hi");
    child.validate().unwrap();
  }
}
