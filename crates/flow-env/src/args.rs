//! Argument parsing and resolution.
//!
//! Arguments arrive as the caller's argv: named `flag=value` pairs and
//! positional values. Per argument the resolution order is: caller-supplied
//! env value, flag match, positional match, declared default. Any argument
//! left without a value fails the run.

use std::collections::HashMap;

use flow_types::{directory::expand_vars, Argument, ExecEnvironment};

use crate::error::EnvError;

/// Resolve argv against the declared argument list and return the resulting
/// env map.
pub fn build_args_env_map(
  env_spec: &ExecEnvironment,
  exec_args: &[String],
  env: &HashMap<String, String>,
) -> Result<HashMap<String, String>, EnvError> {
  let resolved = resolve_arg_values(env_spec, exec_args, env)?;
  Ok(args_to_env_map(&resolved))
}

/// Split argv into flag matches and positional values.
fn parse_args(
  env_spec: &ExecEnvironment,
  exec_args: &[String],
) -> (HashMap<String, String>, Vec<String>) {
  let flags = env_spec.flags();
  let mut flag_args = HashMap::new();
  let mut pos_args = Vec::new();

  for arg in exec_args {
    match arg.split_once('=') {
      Some((flag, value)) if flags.contains(&flag) => {
        flag_args.insert(flag.to_string(), value.to_string());
      }
      _ => pos_args.push(arg.clone()),
    }
  }
  (flag_args, pos_args)
}

/// Resolve values for the declared argument list.
///
/// `${VAR}` references in argv are expanded against the env map before
/// matching, so a parent can forward env-carried values positionally.
pub fn resolve_arg_values(
  env_spec: &ExecEnvironment,
  exec_args: &[String],
  env: &HashMap<String, String>,
) -> Result<Vec<Argument>, EnvError> {
  if env_spec.args.is_empty() {
    return Ok(Vec::new());
  }

  let expanded: Vec<String> = exec_args
    .iter()
    .map(|a| expand_vars(a, |key| env.get(key).cloned()))
    .collect();

  let (flag_args, pos_args) = parse_args(env_spec, &expanded);

  let mut args = env_spec.args.clone();
  for arg in &mut args {
    if !arg.env_key.is_empty() {
      if let Some(val) = env.get(&arg.env_key) {
        // Use the input value if provided
        arg.set_value(val.clone());
        continue;
      }
    }

    if !arg.flag.is_empty() {
      if let Some(val) = flag_args.get(&arg.flag) {
        arg.set_value(val.clone());
      }
    } else if let Some(pos) = arg.pos {
      if pos >= 1 && pos <= pos_args.len() {
        arg.set_value(pos_args[pos - 1].clone());
      }
    }
  }

  validate_values(&args)?;
  Ok(args)
}

/// Every argument must end up with a value or a default.
fn validate_values(args: &[Argument]) -> Result<(), EnvError> {
  let missing: Vec<&str> = args
    .iter()
    .filter(|a| a.value().is_none())
    .map(|a| a.env_key.as_str())
    .collect();
  if missing.is_empty() {
    Ok(())
  } else {
    Err(EnvError::UnresolvedArguments {
      env_keys: missing.join(", "),
    })
  }
}

pub fn args_to_env_map(args: &[Argument]) -> HashMap<String, String> {
  let mut env_map = HashMap::new();
  for arg in args {
    if !arg.output_file.is_empty() && arg.env_key.is_empty() {
      continue;
    }
    env_map.insert(
      arg.env_key.clone(),
      arg.value().unwrap_or_default().to_string(),
    );
  }
  env_map
}

pub fn filter_args_with_output_file(args: Vec<Argument>) -> Vec<Argument> {
  args
    .into_iter()
    .filter(|a| !a.output_file.is_empty())
    .collect()
}

/// Build an argv from the provided env and the child's expected argument
/// list: positional values in declaration position order, flag arguments
/// appended after.
pub fn build_args_from_env(
  args_list: &[Argument],
  input_env: &HashMap<String, String>,
) -> Vec<String> {
  if args_list.is_empty() {
    return Vec::new();
  }

  let mut positional: Vec<(usize, String)> = Vec::new();
  let mut flags: Vec<(String, String)> = Vec::new();

  for arg in args_list {
    if arg.env_key.is_empty() {
      continue;
    }
    if let Some(value) = input_env.get(&arg.env_key) {
      if let Some(pos) = arg.pos {
        positional.push((pos, value.clone()));
      }
      if !arg.flag.is_empty() {
        flags.push((arg.flag.clone(), value.clone()));
      }
    }
  }

  positional.sort_by_key(|(pos, _)| *pos);

  let mut result: Vec<String> = positional.into_iter().map(|(_, v)| v).collect();
  for (flag, value) in flags {
    result.push(format!("{flag}={value}"));
  }
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spec(args: Vec<Argument>) -> ExecEnvironment {
    ExecEnvironment {
      params: Vec::new(),
      args,
    }
  }

  fn flag_arg(env_key: &str, flag: &str) -> Argument {
    let mut arg = Argument::default();
    arg.env_key = env_key.to_string();
    arg.flag = flag.to_string();
    arg
  }

  fn pos_arg(env_key: &str, pos: usize) -> Argument {
    let mut arg = Argument::default();
    arg.env_key = env_key.to_string();
    arg.pos = Some(pos);
    arg
  }

  fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn flags_and_positions_resolve() {
    let env_spec = spec(vec![flag_arg("MODE", "mode"), pos_arg("TARGET", 1)]);
    let env_map = build_args_env_map(
      &env_spec,
      &strings(&["mode=fast", "api"]),
      &HashMap::new(),
    )
    .unwrap();
    assert_eq!(env_map.get("MODE"), Some(&"fast".to_string()));
    assert_eq!(env_map.get("TARGET"), Some(&"api".to_string()));
  }

  #[test]
  fn env_value_wins_over_argv() {
    let env_spec = spec(vec![pos_arg("TARGET", 1)]);
    let env = HashMap::from([("TARGET".to_string(), "from-env".to_string())]);
    let env_map = build_args_env_map(&env_spec, &strings(&["from-argv"]), &env).unwrap();
    assert_eq!(env_map.get("TARGET"), Some(&"from-env".to_string()));
  }

  #[test]
  fn default_fills_missing_value() {
    let mut arg = flag_arg("PORT", "port");
    arg.default = Some("8080".to_string());
    let env_spec = spec(vec![arg]);
    let env_map = build_args_env_map(&env_spec, &[], &HashMap::new()).unwrap();
    assert_eq!(env_map.get("PORT"), Some(&"8080".to_string()));
  }

  #[test]
  fn missing_value_without_default_fails() {
    let env_spec = spec(vec![pos_arg("TARGET", 1)]);
    let err = build_args_env_map(&env_spec, &[], &HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("TARGET"));
  }

  #[test]
  fn argv_values_expand_env_references() {
    let env_spec = spec(vec![flag_arg("VAR", "var")]);
    let env = HashMap::from([("TEST_VAR".to_string(), "test_value".to_string())]);
    let env_map =
      build_args_env_map(&env_spec, &strings(&["var=$TEST_VAR"]), &env).unwrap();
    assert_eq!(env_map.get("VAR"), Some(&"test_value".to_string()));
  }

  #[test]
  fn unknown_flags_are_positional() {
    let env_spec = spec(vec![flag_arg("MODE", "mode"), pos_arg("FIRST", 1)]);
    let env_map = build_args_env_map(
      &env_spec,
      &strings(&["other=value", "mode=fast"]),
      &HashMap::new(),
    )
    .unwrap();
    // other= is not a declared flag so it is the first positional value
    assert_eq!(env_map.get("FIRST"), Some(&"other=value".to_string()));
    assert_eq!(env_map.get("MODE"), Some(&"fast".to_string()));
  }

  #[test]
  fn build_args_from_env_orders_positionals() {
    let args = vec![
      pos_arg("SECOND", 2),
      pos_arg("FIRST", 1),
      flag_arg("MODE", "mode"),
    ];
    let env = HashMap::from([
      ("FIRST".to_string(), "a".to_string()),
      ("SECOND".to_string(), "b".to_string()),
      ("MODE".to_string(), "fast".to_string()),
    ]);
    let argv = build_args_from_env(&args, &env);
    assert_eq!(argv, strings(&["a", "b", "mode=fast"]));
  }

  #[test]
  fn build_args_from_env_skips_unset_keys() {
    let args = vec![pos_arg("FIRST", 1), flag_arg("MODE", "mode")];
    let env = HashMap::from([("FIRST".to_string(), "a".to_string())]);
    let argv = build_args_from_env(&args, &env);
    assert_eq!(argv, strings(&["a"]));
  }

  #[test]
  fn output_file_only_args_excluded_from_env() {
    let mut arg = pos_arg("", 1);
    arg.output_file = "out.txt".to_string();
    arg.default = Some("content".to_string());
    let resolved = resolve_arg_values(&spec(vec![arg]), &[], &HashMap::new()).unwrap();
    let env_map = args_to_env_map(&resolved);
    assert!(env_map.is_empty());
  }
}
