//! The HTTP request runner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flow_context::ExecutionContext;
use flow_engine::Engine;
use flow_env::{build_env_map, create_temp_env_files, default_env};
use flow_types::directory::expand_vars;
use flow_types::{Executable, HttpMethod, RequestSpec, SaveFormat};
use minijinja::context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatch::Runner;
use crate::error::RunnerError;
use crate::expr;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_VALID_STATUS_CODES: &[u16] = &[200, 201, 202, 203, 204];

pub struct RequestRunner;

#[async_trait]
impl Runner for RequestRunner {
  fn name(&self) -> &'static str {
    "request"
  }

  fn is_compatible(&self, executable: &Executable) -> bool {
    executable.request.is_some()
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
      .request
      .as_ref()
      .ok_or_else(|| RunnerError::validation("missing request spec"))?;

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

    let url = expand_vars(&spec.url, |key| env_map.get(key).cloned());
    if url.is_empty() {
      return Err(RunnerError::validation("request url must be specified"));
    }

    let response = send_request(spec, &url, &env_map, cancel).await?;
    let body = transform_body(spec, &response)?;

    if let Some(response_file) = &spec.response_file {
      let tmp = ctx.process_tmp_dir();
      let (dest_dir, tmp_root) = response_file.dir.expand(
        executable.workspace_path(),
        executable.flowfile_path(),
        tmp.as_deref(),
        &env_map,
      )?;
      if let Some(root) = tmp_root {
        ctx.set_process_tmp_dir(root);
      }
      std::fs::create_dir_all(&dest_dir)?;
      let dest = dest_dir.join(&response_file.filename);
      let content = serialize_body(&body, response_file.save_as)?;
      std::fs::write(&dest, content)?;
      info!(file = %dest.display(), "saved response to file");
    }

    if spec.log_response {
      info!(url = %url, "{body}");
    }

    Ok(())
  }
}

struct ResponseParts {
  status: u16,
  headers: HashMap<String, String>,
  body: String,
}

/// Issue the request and validate the response status.
async fn send_request(
  spec: &RequestSpec,
  url: &str,
  env_map: &HashMap<String, String>,
  cancel: CancellationToken,
) -> Result<ResponseParts, RunnerError> {
  let timeout = spec
    .timeout_ms
    .map(Duration::from_millis)
    .unwrap_or(DEFAULT_TIMEOUT);
  let client = reqwest::Client::builder()
    .timeout(timeout)
    .build()
    .map_err(RunnerError::Transport)?;

  let method = match spec.method {
    HttpMethod::GET => reqwest::Method::GET,
    HttpMethod::POST => reqwest::Method::POST,
    HttpMethod::PUT => reqwest::Method::PUT,
    HttpMethod::PATCH => reqwest::Method::PATCH,
    HttpMethod::DELETE => reqwest::Method::DELETE,
  };

  let mut request = client.request(method, url);
  for (key, value) in &spec.headers {
    request = request.header(key, expand_vars(value, |k| env_map.get(k).cloned()));
  }
  if !spec.body.is_empty() {
    let body = expand_vars(&spec.body, |k| env_map.get(k).cloned());
    request = request.body(body.into_bytes());
  }

  debug!(method = spec.method.as_str(), url = %url, "sending request");

  let response = tokio::select! {
    response = request.send() => response.map_err(RunnerError::Transport)?,
    _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
  };

  let status = response.status().as_u16();
  let valid = if spec.valid_status_codes.is_empty() {
    DEFAULT_VALID_STATUS_CODES.contains(&status)
  } else {
    spec.valid_status_codes.contains(&status)
  };
  if !valid {
    return Err(RunnerError::UnexpectedStatusCode {
      status,
      url: url.to_string(),
    });
  }

  let headers: HashMap<String, String> = response
    .headers()
    .iter()
    .filter_map(|(k, v)| {
      v.to_str()
        .ok()
        .map(|val| (k.as_str().to_string(), val.to_string()))
    })
    .collect();
  let body = response.text().await.map_err(RunnerError::Transport)?;

  Ok(ResponseParts {
    status,
    headers,
    body,
  })
}

/// Apply `transform_response` to the body, if declared.
fn transform_body(spec: &RequestSpec, response: &ResponseParts) -> Result<String, RunnerError> {
  if spec.transform_response.is_empty() {
    return Ok(response.body.clone());
  }
  let data = context! {
    status => response.status,
    headers => &response.headers,
    body => &response.body,
  };
  expr::eval_to_string(&spec.transform_response, &data)
}

/// Re-serialize the body per the requested save format.
fn serialize_body(body: &str, save_as: SaveFormat) -> Result<String, RunnerError> {
  match save_as {
    SaveFormat::Raw => Ok(body.to_string()),
    SaveFormat::Json => {
      let value = parse_body(body)?;
      serde_json::to_string_pretty(&value).map_err(|e| RunnerError::Validation {
        message: format!("unable to serialize response as JSON: {e}"),
      })
    }
    SaveFormat::Yaml => {
      let value = parse_body(body)?;
      serde_yaml::to_string(&value).map_err(|e| RunnerError::Validation {
        message: format!("unable to serialize response as YAML: {e}"),
      })
    }
  }
}

fn parse_body(body: &str) -> Result<serde_json::Value, RunnerError> {
  if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
    return Ok(value);
  }
  serde_yaml::from_str::<serde_json::Value>(body).map_err(|e| RunnerError::Validation {
    message: format!("unable to parse response body: {e}"),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn raw_save_passes_bytes_through() {
    assert_eq!(
      serialize_body("not json at all {", SaveFormat::Raw).unwrap(),
      "not json at all {"
    );
  }

  #[test]
  fn json_save_pretty_prints() {
    let out = serialize_body(r#"{"key":"value"}"#, SaveFormat::Json).unwrap();
    assert!(out.contains("\"key\": \"value\""));
  }

  #[test]
  fn yaml_save_reserializes() {
    let out = serialize_body(r#"{"key":"value"}"#, SaveFormat::Yaml).unwrap();
    assert_eq!(out.trim(), "key: value");
  }

  #[test]
  fn transform_applies_expression() {
    let spec = RequestSpec {
      transform_response: "upper(body)".to_string(),
      ..Default::default()
    };
    let response = ResponseParts {
      status: 200,
      headers: HashMap::new(),
      body: "ok".to_string(),
    };
    assert_eq!(transform_body(&spec, &response).unwrap(), "OK");
  }

  #[test]
  fn transform_sees_status_and_headers() {
    let spec = RequestSpec {
      transform_response: "body ~ ':' ~ status".to_string(),
      ..Default::default()
    };
    let response = ResponseParts {
      status: 201,
      headers: HashMap::new(),
      body: "created".to_string(),
    };
    assert_eq!(transform_body(&spec, &response).unwrap(), "created:201");
  }
}
