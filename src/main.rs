use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use flow_context::{
  ExecutionContext, FileStore, LookupError, StoreReader, WorkspaceLookup,
};
use flow_engine::ExecEngine;
use flow_runner::{dispatch, register_default_runners, shell, RunnerError};
use flow_types::config::cache_dir_path;
use flow_types::{Executable, ExecutableRef, LogMode, UserConfig, Verb, Workspace};

mod cache;
mod vault;

use cache::CacheLookup;
use vault::FileVault;

/// flowrun - run declared executables from workspace flowfiles
#[derive(Parser)]
#[command(name = "flowrun")]
#[command(version, about, long_about = None)]
struct Cli {
  /// The executable verb (exec, build, start, show, ...)
  verb: String,

  /// The executable ID in the form [workspace/][namespace:]name
  target: Option<String>,

  /// Flag (`name=value`) and positional arguments for the executable
  #[arg(trailing_var_arg = true)]
  args: Vec<String>,

  /// Override a parameter value (KEY=VALUE, repeatable)
  #[arg(long = "param")]
  params: Vec<String>,

  /// Log mode override (text, json, logfmt)
  #[arg(long = "log-mode")]
  log_mode: Option<String>,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  shell::setup_color_environment();

  let config = UserConfig::load().context("user config load error")?;

  let log_mode = match &cli.log_mode {
    Some(raw) => {
      LogMode::parse(raw).with_context(|| format!("invalid log mode '{raw}'"))?
    }
    None => config.default_log_mode(),
  };
  init_tracing(log_mode);

  let rt = tokio::runtime::Runtime::new()?;
  let exit_code = rt.block_on(run(cli, config))?;
  if exit_code != 0 {
    std::process::exit(exit_code);
  }
  Ok(())
}

async fn run(cli: Cli, config: UserConfig) -> Result<i32> {
  let verb: Verb = cli.verb.parse().with_context(|| {
    format!(
      "invalid verb '{}' (expected one of: {})",
      cli.verb,
      Verb::sorted_valid_verbs().join(", ")
    )
  })?;

  let workspace_name = config.current_workspace.clone();
  let workspace_path = config
    .current_workspace_path()
    .cloned()
    .with_context(|| format!("current workspace '{workspace_name}' not found"))?;
  let workspace = Workspace::load(&workspace_name, &workspace_path)
    .context("workspace config load error")?;

  let executables = CacheLookup::new(config.clone()).context("executable cache scan error")?;
  let store: Arc<dyn StoreReader> =
    Arc::new(FileStore::new(cache_dir_path().join("store.json")));
  let cancel = CancellationToken::new();

  let ctx = ExecutionContext::builder()
    .config(config.clone())
    .workspace(workspace.clone())
    .namespace(config.current_namespace.clone())
    .executables(executables)
    .secrets(Arc::new(FileVault::new()))
    .workspaces(Arc::new(ConfigWorkspaces {
      config: config.clone(),
    }))
    .store(store.clone())
    .cancellation_token(cancel.clone())
    .build();

  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      cancel.cancel();
    }
  });

  let reference = ExecutableRef::parse_id(verb, cli.target.as_deref().unwrap_or(""))
    .expanded(&workspace_name, &config.current_namespace);
  let executable = dispatch::resolve_executable(&ctx, &reference)
    .with_context(|| format!("unable to resolve '{reference}'"))?;
  executable.validate()?;

  if !executable.is_executable_from_workspace(&workspace_name) {
    bail!("executable '{reference}' cannot be executed from workspace {workspace_name}");
  }

  let mut input_env = HashMap::new();
  apply_workspace_env_files(&ctx, &executable, &mut input_env);
  apply_parameter_overrides(&cli.params, &mut input_env);
  collect_prompt_values(&ctx, &executable, &mut input_env)?;

  register_default_runners();
  let engine = Arc::new(ExecEngine::new());

  let start = Instant::now();
  let result = dispatch::exec(
    ctx.clone(),
    executable,
    engine,
    ctx.cancellation_token(),
    input_env,
    cli.args.clone(),
  )
  .await;

  ctx.finalize();
  if let Err(e) = store.clear() {
    error!(error = %e, "failed clearing process store");
  }

  match result {
    Ok(()) => {
      debug!(
        reference = %reference,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "flow completed"
      );
      Ok(0)
    }
    Err(RunnerError::ExitStatus { code }) => {
      error!(reference = %reference, code, "flow failed");
      Ok(code)
    }
    Err(e) => {
      error!(reference = %reference, error = %e, "flow failed");
      Ok(1)
    }
  }
}

fn init_tracing(log_mode: LogMode) {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  match log_mode {
    LogMode::Json => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();
    }
    LogMode::Text | LogMode::Logfmt => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    }
  }
}

/// Load env files declared by the executable's own workspace (or its root
/// `.env`) into the input env. A public executable may be invoked from a
/// different workspace, so the executable's workspace is resolved rather
/// than assumed to be the current one.
fn apply_workspace_env_files(
  ctx: &ExecutionContext,
  executable: &Executable,
  env_map: &mut HashMap<String, String>,
) {
  let workspace = if executable.workspace() == ctx.current_workspace.assigned_name() {
    ctx.current_workspace.clone()
  } else {
    match ctx.workspaces.get(executable.workspace()) {
      Ok(workspace) => workspace,
      Err(e) => {
        error!(
          error = %e,
          workspace = executable.workspace(),
          "unable to resolve the executable's workspace"
        );
        return;
      }
    }
  };

  let location = workspace.location().to_string_lossy().to_string();
  if !workspace.env_files.is_empty() {
    match flow_env::load_env_from_files(&workspace.env_files, &location) {
      Ok(loaded) => env_map.extend(loaded),
      Err(e) => error!(error = %e, "failed loading env files for workspace"),
    }
    return;
  }

  let root_env_file = workspace.location().join(".env");
  if root_env_file.is_file() {
    let file = root_env_file.to_string_lossy().to_string();
    match flow_env::load_env_from_files(&[file], &location) {
      Ok(loaded) => env_map.extend(loaded),
      Err(e) => error!(error = %e, "failed loading root env file"),
    }
  }
}

/// Fold repeated `--param KEY=VALUE` overrides into the input env.
fn apply_parameter_overrides(overrides: &[String], env_map: &mut HashMap<String, String>) {
  for override_str in overrides {
    if let Some((key, value)) = override_str.split_once('=') {
      env_map.insert(key.to_string(), value.to_string());
    }
  }
}

/// Collect values for prompt parameters that have no value yet, walking
/// serial/parallel children recursively.
fn collect_prompt_values(
  ctx: &ExecutionContext,
  executable: &Executable,
  env_map: &mut HashMap<String, String>,
) -> Result<()> {
  let pending = pending_prompts(ctx, executable, env_map);
  if pending.is_empty() {
    return Ok(());
  }
  if !ctx.config.interactive_enabled() {
    bail!("prompt parameters require interactive mode");
  }

  let stdin = std::io::stdin();
  for (env_key, prompt) in pending {
    eprint!("{prompt}: ");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    env_map.insert(env_key, line.trim_end_matches('\n').to_string());
  }
  Ok(())
}

fn pending_prompts(
  ctx: &ExecutionContext,
  executable: &Executable,
  env_map: &HashMap<String, String>,
) -> Vec<(String, String)> {
  let mut pending = Vec::new();

  if let Some(env_spec) = executable.env() {
    for param in &env_spec.params {
      if !param.prompt.is_empty() && !env_map.contains_key(&param.env_key) {
        pending.push((param.env_key.clone(), param.prompt.clone()));
      }
    }
  }

  let children = executable
    .serial
    .as_ref()
    .map(|s| s.execs.as_slice())
    .or_else(|| executable.parallel.as_ref().map(|p| p.execs.as_slice()))
    .unwrap_or(&[]);
  for child in children {
    if child.exec_ref.is_empty() {
      continue;
    }
    let Ok(reference) = child.exec_ref.parse::<ExecutableRef>() else {
      continue;
    };
    let expanded = reference.expanded(executable.workspace(), executable.namespace());
    if let Ok(child_exec) = ctx.executables.get(&expanded) {
      pending.extend(pending_prompts(ctx, &child_exec, env_map));
    }
  }

  pending
}

/// Workspace lookup backed by the user config's registered workspaces.
struct ConfigWorkspaces {
  config: UserConfig,
}

impl WorkspaceLookup for ConfigWorkspaces {
  fn get(&self, name: &str) -> Result<Workspace, LookupError> {
    let path = self
      .config
      .workspaces
      .get(name)
      .ok_or_else(|| LookupError::WorkspaceNotFound {
        workspace: name.to_string(),
      })?;
    Workspace::load(name, path).map_err(|e| LookupError::WorkspaceNotFound {
      workspace: format!("{name} ({e})"),
    })
  }
}
