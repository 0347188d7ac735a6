//! The template render runner.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use flow_context::ExecutionContext;
use flow_engine::Engine;
use flow_env::{build_env_map, create_temp_env_files, default_env};
use flow_types::Executable;
use minijinja::{context, Environment};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatch::Runner;
use crate::error::RunnerError;

const CONTENT_START_MARKER: &str = "### Rendered Content Start ###";
const CONTENT_END_MARKER: &str = "### Rendered Content End ###";

pub struct RenderRunner;

#[async_trait]
impl Runner for RenderRunner {
  fn name(&self) -> &'static str {
    "render"
  }

  fn is_compatible(&self, executable: &Executable) -> bool {
    executable.render.is_some()
  }

  async fn exec(
    &self,
    ctx: Arc<ExecutionContext>,
    executable: Arc<Executable>,
    _engine: Arc<dyn Engine>,
    _cancel: CancellationToken,
    input_env: HashMap<String, String>,
    input_args: Vec<String>,
  ) -> Result<(), RunnerError> {
    if !ctx.config.interactive_enabled() {
      return Err(RunnerError::validation(
        "unable to render when interactive mode is disabled",
      ));
    }

    let spec = executable
      .render
      .as_ref()
      .ok_or_else(|| RunnerError::validation("missing render spec"))?;
    if spec.template_file.is_empty() {
      return Err(RunnerError::validation("template file must be specified"));
    }

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

    let content_file = target_dir.join(&spec.template_file);
    let template_data = if spec.template_data_file.is_empty() {
      serde_json::Value::Null
    } else {
      read_data_file(&target_dir, &spec.template_data_file)?
    };

    let rendered = render_template(&content_file, &template_data)?;

    info!(file = %content_file.display(), "rendering content from file");

    // The interactive markdown viewer lives outside the core; rendered
    // content always goes to stdout between markers.
    println!("{CONTENT_START_MARKER}");
    println!("{rendered}");
    println!("{CONTENT_END_MARKER}");
    Ok(())
  }
}

fn render_template(
  content_file: &Path,
  template_data: &serde_json::Value,
) -> Result<String, RunnerError> {
  let template = std::fs::read_to_string(content_file).map_err(|e| RunnerError::Template {
    message: format!(
      "unable to read template file {}: {e}",
      content_file.display()
    ),
  })?;

  let env = Environment::new();
  env
    .render_str(&template, context! { data => template_data })
    .map_err(|e| RunnerError::Template {
      message: format!(
        "unable to render template file {}: {e}",
        content_file.display()
      ),
    })
}

/// Read and unmarshal the template data file by extension.
fn read_data_file(dir: &Path, path: &str) -> Result<serde_json::Value, RunnerError> {
  let data_file_path = dir.join(path);
  if !data_file_path.is_file() {
    return Err(RunnerError::Template {
      message: format!(
        "template data file {} does not exist",
        data_file_path.display()
      ),
    });
  }
  let data = std::fs::read_to_string(&data_file_path)?;

  let extension = data_file_path
    .extension()
    .and_then(|e| e.to_str())
    .unwrap_or_default();
  match extension {
    "json" => serde_json::from_str(&data).map_err(|e| RunnerError::Template {
      message: format!(
        "unable to unmarshal template data file {}: {e}",
        data_file_path.display()
      ),
    }),
    "yaml" | "yml" => serde_yaml::from_str(&data).map_err(|e| RunnerError::Template {
      message: format!(
        "unable to unmarshal template data file {}: {e}",
        data_file_path.display()
      ),
    }),
    other => Err(RunnerError::Template {
      message: format!("unsupported template data file extension '{other}'"),
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_renders_with_data() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("greeting.md");
    std::fs::write(&template, "# Hello {{ data.name }}\n").unwrap();

    let data = serde_json::json!({ "name": "world" });
    let rendered = render_template(&template, &data).unwrap();
    assert_eq!(rendered.trim(), "# Hello world");
  }

  #[test]
  fn data_file_parsed_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.json"), r#"{"count": 3}"#).unwrap();
    std::fs::write(dir.path().join("data.yaml"), "count: 4\n").unwrap();

    let json = read_data_file(dir.path(), "data.json").unwrap();
    assert_eq!(json["count"], 3);
    let yaml = read_data_file(dir.path(), "data.yaml").unwrap();
    assert_eq!(yaml["count"], 4);

    assert!(read_data_file(dir.path(), "missing.json").is_err());

    std::fs::write(dir.path().join("data.toml"), "count = 5\n").unwrap();
    assert!(read_data_file(dir.path(), "data.toml").is_err());
  }
}
