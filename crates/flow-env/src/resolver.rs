//! Env map construction and temp-file materialization.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use flow_context::{ExecutionContext, SecretLookup};
use flow_types::directory::expand_vars;
use flow_types::{config, Directory, ExecEnvironment, Executable};
use tracing::debug;

use crate::args::{
  build_args_env_map, filter_args_with_output_file, resolve_arg_values,
};
use crate::error::EnvError;
use crate::params::resolve_parameter_value;

/// Env var that disables interactive views in child processes.
pub const DISABLE_INTERACTIVE_ENV: &str = "DISABLE_INTERACTIVE";

/// The injected defaults every executable run receives.
pub fn default_env(ctx: &ExecutionContext, executable: &Executable) -> HashMap<String, String> {
  let mut env_map = HashMap::new();
  env_map.insert("FLOW_RUNNER".to_string(), "true".to_string());
  env_map.insert(
    "FLOW_CURRENT_WORKSPACE".to_string(),
    ctx.current_workspace.assigned_name().to_string(),
  );
  env_map.insert(
    "FLOW_CURRENT_NAMESPACE".to_string(),
    ctx.current_namespace.clone(),
  );
  if let Some(tmp) = ctx.process_tmp_dir() {
    env_map.insert(
      "FLOW_TMP_DIRECTORY".to_string(),
      tmp.display().to_string(),
    );
  }
  env_map.insert(
    "FLOW_EXECUTABLE_NAME".to_string(),
    executable.name.clone(),
  );
  env_map.insert(
    "FLOW_DEFINITION_PATH".to_string(),
    executable.flowfile_path().display().to_string(),
  );
  env_map.insert(
    "FLOW_DEFINITION_DIR".to_string(),
    executable.flowfile_dir().display().to_string(),
  );
  env_map.insert(
    "FLOW_WORKSPACE_PATH".to_string(),
    executable.workspace_path().display().to_string(),
  );
  env_map.insert(
    "FLOW_CONFIG_PATH".to_string(),
    config::config_dir_path().display().to_string(),
  );
  env_map.insert(
    "FLOW_CACHE_PATH".to_string(),
    config::cache_dir_path().display().to_string(),
  );

  let disable_interactive = std::env::var(DISABLE_INTERACTIVE_ENV)
    .ok()
    .filter(|v| !v.is_empty())
    .unwrap_or_else(|| "true".to_string());
  env_map.insert(DISABLE_INTERACTIVE_ENV.to_string(), disable_interactive);

  env_map
}

/// Construct the final env map for one executable.
///
/// Merge order: the caller's input env wins over everything; injected
/// defaults fill unset keys; declared parameters resolve in declaration
/// order; arguments resolve last and undergo a second `${VAR}` expansion
/// against the accumulated map. Resolution failures are collected and
/// reported as one aggregate error.
pub fn build_env_map(
  secrets: &dyn SecretLookup,
  current_vault: &str,
  env_spec: &ExecEnvironment,
  input_args: &[String],
  input_env: &HashMap<String, String>,
  default_env: &HashMap<String, String>,
) -> Result<HashMap<String, String>, EnvError> {
  let mut errs = Vec::new();
  let mut env_map = input_env.clone();

  for (k, v) in default_env {
    env_map.entry(k.clone()).or_insert_with(|| v.clone());
  }

  for param in &env_spec.params {
    if !param.output_file.is_empty() {
      // Materialized separately by create_temp_env_files.
      continue;
    }
    if !param.env_file.is_empty() {
      let fallback = default_env
        .get("FLOW_DEFINITION_DIR")
        .cloned()
        .unwrap_or_default();
      let dot_env = match read_dot_env_file(&param.env_file, &fallback) {
        Ok(map) => map,
        Err(e) => {
          errs.push(e);
          continue;
        }
      };
      if !param.env_key.is_empty() {
        match dot_env.get(&param.env_key) {
          Some(val) => {
            if !input_env.contains_key(&param.env_key) {
              env_map.insert(param.env_key.clone(), val.clone());
            }
          }
          None => errs.push(EnvError::EnvFileKeyMissing {
            key: param.env_key.clone(),
            file: param.env_file.clone(),
          }),
        }
      } else {
        for (k, v) in dot_env {
          if !input_env.contains_key(&k) {
            env_map.insert(k, v);
          }
        }
      }
      continue;
    }
    if param.env_key.is_empty() {
      continue;
    }

    match resolve_parameter_value(secrets, current_vault, param, &env_map) {
      Ok(val) => {
        env_map.insert(param.env_key.clone(), val);
      }
      Err(e) => errs.push(e),
    }
  }

  match build_args_env_map(env_spec, input_args, &env_map) {
    Ok(arg_env) => {
      for (key, val) in arg_env {
        let expanded = expand_vars(&val, |k| env_map.get(k).cloned());
        env_map.insert(key, expanded);
      }
    }
    Err(e) => errs.push(e),
  }

  if errs.is_empty() {
    Ok(env_map)
  } else {
    Err(EnvError::aggregate(errs))
  }
}

/// Convert an env map into a sorted `(key, value)` list for process spawning.
pub fn env_map_to_list(env_map: &HashMap<String, String>) -> Vec<(String, String)> {
  let mut list: Vec<(String, String)> = env_map
    .iter()
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();
  list.sort_by(|a, b| a.0.cmp(&b.0));
  list
}

/// Load and merge several `KEY=VALUE` files.
pub fn load_env_from_files(
  files: &[String],
  expansion_fallback_dir: &str,
) -> Result<HashMap<String, String>, EnvError> {
  let mut env_map = HashMap::new();
  for file in files {
    let dot_env = read_dot_env_file(file, expansion_fallback_dir)?;
    env_map.extend(dot_env);
  }
  Ok(env_map)
}

/// Parse a `KEY=VALUE` file; blank lines and `#` comments are skipped.
pub fn read_dot_env_file(
  file: &str,
  expansion_fallback_dir: &str,
) -> Result<HashMap<String, String>, EnvError> {
  if file.is_empty() {
    return Err(EnvError::EnvFileUnreadable {
      file: file.to_string(),
      message: "env file path is empty".to_string(),
    });
  }

  let path = expand_path(file, expansion_fallback_dir);
  let data = std::fs::read_to_string(&path).map_err(|e| EnvError::EnvFileUnreadable {
    file: file.to_string(),
    message: e.to_string(),
  })?;

  let mut env_map = HashMap::new();
  for line in data.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    if let Some((key, value)) = line.split_once('=') {
      env_map.insert(key.to_string(), value.to_string());
    }
  }
  Ok(env_map)
}

/// Expand env references and `~`, then resolve relative paths against the
/// fallback directory.
fn expand_path(file: &str, fallback_dir: &str) -> PathBuf {
  let expanded = expand_vars(file, |key| std::env::var(key).ok());
  let expanded = if let Some(rest) = expanded.strip_prefix("~/") {
    match std::env::var("HOME") {
      Ok(home) => format!("{home}/{rest}"),
      Err(_) => expanded,
    }
  } else {
    expanded
  };

  let path = PathBuf::from(&expanded);
  if path.is_absolute() || fallback_dir.is_empty() {
    path
  } else {
    Path::new(fallback_dir).join(path)
  }
}

/// Materialize output files for parameters and arguments that declare one.
///
/// Each file's deletion is registered as a context callback so it is removed
/// on finalize. Creation failures accumulate and do not short-circuit the
/// remaining files; the cleanup callback always covers what was created.
pub fn create_temp_env_files(
  ctx: &ExecutionContext,
  secrets: &dyn SecretLookup,
  current_vault: &str,
  flowfile_path: &Path,
  workspace_path: &Path,
  env_spec: &ExecEnvironment,
  input_args: &[String],
  prompted_env: &HashMap<String, String>,
) -> Result<(), EnvError> {
  let mut errs = Vec::new();
  let mut temp_files: Vec<PathBuf> = Vec::new();

  for param in &env_spec.params {
    if param.output_file.is_empty() {
      continue;
    }
    let val = match resolve_parameter_value(secrets, current_vault, param, prompted_env) {
      Ok(val) => val,
      Err(e) => {
        errs.push(e);
        continue;
      }
    };
    match create_env_value_file(
      ctx,
      &param.output_file,
      &val,
      workspace_path,
      flowfile_path,
      prompted_env,
    ) {
      Ok(dest) => temp_files.push(dest),
      Err(e) => errs.push(e),
    }
  }

  match resolve_arg_values(env_spec, input_args, prompted_env) {
    Ok(resolved) => {
      for arg in filter_args_with_output_file(resolved) {
        let content = arg.value().unwrap_or_default().to_string();
        match create_env_value_file(
          ctx,
          &arg.output_file,
          &content,
          workspace_path,
          flowfile_path,
          prompted_env,
        ) {
          Ok(dest) => temp_files.push(dest),
          Err(e) => errs.push(e),
        }
      }
    }
    Err(e) => errs.push(e),
  }

  if !temp_files.is_empty() {
    ctx.add_callback(Box::new(move || {
      for temp_file in &temp_files {
        if let Err(e) = std::fs::remove_file(temp_file) {
          return Err(flow_context::ContextError::Cleanup {
            message: format!("failed to remove temp file {}: {e}", temp_file.display()),
          });
        }
      }
      Ok(())
    }));
  }

  if errs.is_empty() {
    Ok(())
  } else {
    Err(EnvError::aggregate(errs))
  }
}

/// Write one resolved value to its destination file.
///
/// The destination's parent expands like any declared directory (so `$TMP`
/// and `//` work); parents are created 0755 and the file is written 0600.
fn create_env_value_file(
  ctx: &ExecutionContext,
  destination: &str,
  content: &str,
  workspace_path: &Path,
  flowfile_path: &Path,
  env_map: &HashMap<String, String>,
) -> Result<PathBuf, EnvError> {
  let dest_path = Path::new(destination);
  let filename = dest_path
    .file_name()
    .ok_or_else(|| EnvError::TempFile {
      destination: destination.to_string(),
      message: "destination has no file name".to_string(),
    })?;
  let parent = dest_path
    .parent()
    .map(|p| p.to_string_lossy().to_string())
    .unwrap_or_default();

  let tmp = ctx.process_tmp_dir();
  let (dest_dir, tmp_root) = Directory::new(parent)
    .expand(workspace_path, flowfile_path, tmp.as_deref(), env_map)
    .map_err(|e| EnvError::TempFile {
      destination: destination.to_string(),
      message: e.to_string(),
    })?;
  if let Some(root) = tmp_root {
    ctx.set_process_tmp_dir(root);
  }

  std::fs::create_dir_all(&dest_dir).map_err(|e| EnvError::TempFile {
    destination: destination.to_string(),
    message: format!("failed to create directory: {e}"),
  })?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(&dest_dir, std::fs::Permissions::from_mode(0o755));
  }

  let dest = dest_dir.join(filename);
  std::fs::write(&dest, content).map_err(|e| EnvError::TempFile {
    destination: destination.to_string(),
    message: format!("failed to write file: {e}"),
  })?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o600));
  }

  debug!(dest = %dest.display(), "materialized env value file");
  Ok(dest)
}
