//! Expression evaluation for step gates and response transforms.
//!
//! Expressions are minijinja expressions evaluated against a structured
//! context. Step gates see `{env, store, ctx}`; response transforms see
//! `{status, headers, body}`.

use std::collections::HashMap;

use flow_context::ExecutionContext;
use flow_types::Executable;
use minijinja::{context, Environment, Value};
use serde::Serialize;

use crate::error::RunnerError;

#[derive(Serialize)]
struct CtxData {
  workspace: String,
  namespace: String,
  workspace_path: String,
  flow_file_name: String,
  flow_file_path: String,
  flow_file_dir: String,
}

/// Build the evaluation context for a step gate.
pub fn expression_data(
  ctx: &ExecutionContext,
  executable: &Executable,
  store_data: &HashMap<String, String>,
  env_map: &HashMap<String, String>,
) -> Value {
  let flowfile_path = executable.flowfile_path();
  let file_name = flowfile_path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default();

  context! {
    env => env_map,
    store => store_data,
    ctx => CtxData {
      workspace: ctx.current_workspace.assigned_name().to_string(),
      namespace: ctx.current_namespace.clone(),
      workspace_path: executable.workspace_path().display().to_string(),
      flow_file_name: file_name,
      flow_file_path: flowfile_path.display().to_string(),
      flow_file_dir: executable.flowfile_dir().display().to_string(),
    },
  }
}

/// Evaluate an expression to its truthiness.
pub fn is_truthy(expression: &str, data: &Value) -> Result<bool, RunnerError> {
  let env = expression_environment();
  let compiled = env
    .compile_expression(expression)
    .map_err(|e| RunnerError::Expression {
      message: e.to_string(),
    })?;
  let result = compiled
    .eval(data.clone())
    .map_err(|e| RunnerError::Expression {
      message: e.to_string(),
    })?;
  Ok(result.is_true())
}

/// Evaluate an expression to its string result.
pub fn eval_to_string(expression: &str, data: &Value) -> Result<String, RunnerError> {
  let env = expression_environment();
  let compiled = env
    .compile_expression(expression)
    .map_err(|e| RunnerError::Expression {
      message: e.to_string(),
    })?;
  let result = compiled
    .eval(data.clone())
    .map_err(|e| RunnerError::Expression {
      message: e.to_string(),
    })?;
  match result.as_str() {
    Some(s) => Ok(s.to_string()),
    None => Ok(result.to_string()),
  }
}

/// The expression environment with string helpers registered as functions.
fn expression_environment<'source>() -> Environment<'source> {
  let mut env = Environment::new();
  env.add_function("upper", |s: String| s.to_uppercase());
  env.add_function("lower", |s: String| s.to_lowercase());
  env.add_function("trim", |s: String| s.trim().to_string());
  env
}

#[cfg(test)]
mod tests {
  use super::*;

  fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  fn data(store: &[(&str, &str)], env: &[(&str, &str)]) -> Value {
    let ctx = ExecutionContext::builder().namespace("dev").build();
    let mut executable = Executable::default();
    executable.name = "check".to_string();
    executable.set_context("ws", "/ws", "dev", "/ws/checks.flow");
    expression_data(&ctx, &executable, &map(store), &map(env))
  }

  #[test]
  fn literals_evaluate() {
    let data = data(&[], &[]);
    assert!(is_truthy("true", &data).unwrap());
    assert!(!is_truthy("false", &data).unwrap());
  }

  #[test]
  fn store_lookups_gate_conditions() {
    let data = data(&[("X", "updated")], &[]);
    assert!(is_truthy(r#"store["X"] == "updated""#, &data).unwrap());
    assert!(!is_truthy(r#"store["X"] == "stale""#, &data).unwrap());
    assert!(!is_truthy(r#"store["MISSING"] == "anything""#, &data).unwrap());
  }

  #[test]
  fn env_and_ctx_are_visible() {
    let data = data(&[], &[("MODE", "fast")]);
    assert!(is_truthy(r#"env["MODE"] == "fast""#, &data).unwrap());
    assert!(is_truthy(r#"ctx.workspace == "ws""#, &data).unwrap());
    assert!(is_truthy(r#"ctx.flow_file_name == "checks.flow""#, &data).unwrap());
  }

  #[test]
  fn malformed_expressions_error() {
    let data = data(&[], &[]);
    assert!(is_truthy("store[", &data).is_err());
  }

  #[test]
  fn transform_helpers() {
    let data = context! { status => 200, body => "ok" };
    assert_eq!(eval_to_string("upper(body)", &data).unwrap(), "OK");
    assert_eq!(eval_to_string("lower('LOUD')", &data).unwrap(), "loud");
    assert_eq!(eval_to_string("body ~ ':' ~ status", &data).unwrap(), "ok:200");
  }
}
