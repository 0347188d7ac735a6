//! The executable model.
//!
//! An executable is a declared unit of work: a verb, an identity within a
//! workspace/namespace, and exactly one kind spec (command, serial, parallel,
//! request, render, launch). Kind specs carry the declared environment
//! (parameters and arguments) that the env resolver materializes before the
//! kind runner takes over.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{Aliases, LogMode, Tags, Visibility};
use crate::directory::Directory;
use crate::error::TypeError;
use crate::reference::ExecutableRef;
use crate::verb::Verb;

/// A named input bound to an environment variable.
///
/// At most one of `text`, `secret_ref`, `prompt`, and `env_file` may be set;
/// `output_file` additionally materializes the resolved value to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
  #[serde(default)]
  pub text: String,
  #[serde(default)]
  pub secret_ref: String,
  #[serde(default)]
  pub prompt: String,
  #[serde(default)]
  pub env_file: String,
  #[serde(default)]
  pub output_file: String,
  #[serde(default)]
  pub env_key: String,
}

impl Parameter {
  fn source_count(&self) -> usize {
    [&self.text, &self.secret_ref, &self.prompt, &self.env_file]
      .iter()
      .filter(|s| !s.is_empty())
      .count()
  }

  fn validate(&self) -> Result<(), TypeError> {
    if self.source_count() > 1 {
      return Err(TypeError::Validation {
        message: format!(
          "parameter '{}' declares more than one value source",
          self.env_key
        ),
      });
    }
    if self.env_key.is_empty() && self.env_file.is_empty() && self.output_file.is_empty() {
      return Err(TypeError::Validation {
        message: "parameter must set an env key, an env file, or an output file".to_string(),
      });
    }
    Ok(())
  }
}

/// A positional or flag input parsed from the caller's argv.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
  #[serde(default)]
  pub env_key: String,
  #[serde(default)]
  pub flag: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pos: Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<String>,
  #[serde(default)]
  pub output_file: String,

  #[serde(skip)]
  value: Option<String>,
}

impl Argument {
  pub fn set_value(&mut self, value: impl Into<String>) {
    self.value = Some(value.into());
  }

  /// The resolved value, falling back to the declared default.
  pub fn value(&self) -> Option<&str> {
    self.value.as_deref().or(self.default.as_deref())
  }

  fn validate(&self) -> Result<(), TypeError> {
    if self.flag.is_empty() && self.pos.is_none() {
      return Err(TypeError::Validation {
        message: format!("argument '{}' must set a flag or a position", self.env_key),
      });
    }
    if let Some(pos) = self.pos {
      if pos == 0 {
        return Err(TypeError::Validation {
          message: format!("argument '{}' positions are 1-based", self.env_key),
        });
      }
    }
    Ok(())
  }
}

/// Declared environment of an executable: parameters and arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecEnvironment {
  #[serde(default)]
  pub params: Vec<Parameter>,
  #[serde(default)]
  pub args: Vec<Argument>,
}

impl ExecEnvironment {
  pub fn is_empty(&self) -> bool {
    self.params.is_empty() && self.args.is_empty()
  }

  /// Flag names declared by the argument list.
  pub fn flags(&self) -> Vec<&str> {
    self
      .args
      .iter()
      .filter(|a| !a.flag.is_empty())
      .map(|a| a.flag.as_str())
      .collect()
  }
}

/// A shell program run against a resolved env and working directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
  #[serde(flatten)]
  pub env: ExecEnvironment,
  #[serde(default)]
  pub cmd: String,
  #[serde(default)]
  pub file: String,
  #[serde(default)]
  pub dir: Directory,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub log_mode: Option<LogMode>,

  #[serde(skip)]
  pub log_fields: HashMap<String, String>,
}

impl CommandSpec {
  pub fn set_log_fields(&mut self, fields: HashMap<String, String>) {
    self.log_fields = fields;
  }
}

/// One child of a serial or parallel composite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
  /// Reference to an existing executable. Mutually exclusive with `cmd`.
  #[serde(default, rename = "ref")]
  pub exec_ref: String,
  /// Inline shell command. Mutually exclusive with `ref`.
  #[serde(default)]
  pub cmd: String,
  /// Argv forwarded to the child executable.
  #[serde(default)]
  pub args: Vec<String>,
  /// Expression gating the step; a falsy result skips it.
  #[serde(default, rename = "if")]
  pub condition: String,
  #[serde(default)]
  pub retries: u32,
  #[serde(default)]
  pub review_required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialSpec {
  #[serde(flatten)]
  pub env: ExecEnvironment,
  #[serde(default)]
  pub dir: Directory,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fail_fast: Option<bool>,
  #[serde(default)]
  pub execs: Vec<StepConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelSpec {
  #[serde(flatten)]
  pub env: ExecEnvironment,
  #[serde(default)]
  pub dir: Directory,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fail_fast: Option<bool>,
  /// Concurrency bound; 0 means unlimited up to the number of steps.
  #[serde(default)]
  pub max_threads: usize,
  #[serde(default)]
  pub execs: Vec<StepConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
  GET,
  POST,
  PUT,
  PATCH,
  DELETE,
}

impl HttpMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      HttpMethod::GET => "GET",
      HttpMethod::POST => "POST",
      HttpMethod::PUT => "PUT",
      HttpMethod::PATCH => "PATCH",
      HttpMethod::DELETE => "DELETE",
    }
  }
}

impl Default for HttpMethod {
  fn default() -> Self {
    HttpMethod::GET
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
  Raw,
  Json,
  Yaml,
}

impl Default for SaveFormat {
  fn default() -> Self {
    SaveFormat::Raw
  }
}

/// Where to persist an HTTP response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFileSpec {
  pub filename: String,
  #[serde(default)]
  pub dir: Directory,
  #[serde(default)]
  pub save_as: SaveFormat,
}

/// A single HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
  #[serde(flatten)]
  pub env: ExecEnvironment,
  #[serde(default)]
  pub url: String,
  #[serde(default)]
  pub method: HttpMethod,
  #[serde(default)]
  pub headers: HashMap<String, String>,
  #[serde(default)]
  pub body: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  /// Accepted response codes; defaults to 200-204 when empty.
  #[serde(default)]
  pub valid_status_codes: Vec<u16>,
  /// Expression applied to `{status, headers, body}`; its string result
  /// replaces the body.
  #[serde(default)]
  pub transform_response: String,
  #[serde(default)]
  pub log_response: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub response_file: Option<ResponseFileSpec>,
}

/// A templated text render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
  #[serde(flatten)]
  pub env: ExecEnvironment,
  #[serde(default)]
  pub template_file: String,
  #[serde(default)]
  pub template_data_file: String,
  #[serde(default)]
  pub dir: Directory,
}

/// Open a URI or file with the platform opener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpec {
  #[serde(flatten)]
  pub env: ExecEnvironment,
  #[serde(default)]
  pub uri: String,
  #[serde(default)]
  pub app: String,
  #[serde(default)]
  pub wait: bool,
}

/// Origin of an executable definition, set when its flowfile is parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionContext {
  pub workspace: String,
  pub workspace_path: PathBuf,
  pub namespace: String,
  pub flowfile_path: PathBuf,
}

/// A declared unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Executable {
  #[serde(default)]
  pub verb: Verb,
  pub name: String,
  /// Overrides the flowfile-level namespace for this entry.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub namespace: Option<String>,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub aliases: Aliases,
  #[serde(default)]
  pub tags: Tags,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub visibility: Option<Visibility>,
  /// Whole-run deadline enforced by the dispatcher.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exec: Option<CommandSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub serial: Option<SerialSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parallel: Option<ParallelSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request: Option<RequestSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub render: Option<RenderSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub launch: Option<LaunchSpec>,

  #[serde(skip)]
  ctx: DefinitionContext,
}

impl Executable {
  /// Bind the executable to its defining workspace, namespace, and flowfile.
  pub fn set_context(
    &mut self,
    workspace: &str,
    workspace_path: impl Into<PathBuf>,
    namespace: &str,
    flowfile_path: impl Into<PathBuf>,
  ) {
    self.ctx = DefinitionContext {
      workspace: workspace.to_string(),
      workspace_path: workspace_path.into(),
      namespace: namespace.to_string(),
      flowfile_path: flowfile_path.into(),
    };
  }

  pub fn workspace(&self) -> &str {
    &self.ctx.workspace
  }

  pub fn namespace(&self) -> &str {
    &self.ctx.namespace
  }

  pub fn workspace_path(&self) -> &Path {
    &self.ctx.workspace_path
  }

  pub fn flowfile_path(&self) -> &Path {
    &self.ctx.flowfile_path
  }

  pub fn flowfile_dir(&self) -> PathBuf {
    self
      .ctx
      .flowfile_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."))
  }

  pub fn reference(&self) -> ExecutableRef {
    ExecutableRef::new(
      self.verb,
      &self.ctx.workspace,
      &self.ctx.namespace,
      &self.name,
    )
  }

  pub fn id(&self) -> String {
    self.reference().id()
  }

  pub fn visibility(&self) -> Visibility {
    self.visibility.unwrap_or_default()
  }

  /// Whether this executable may be run from the given workspace.
  pub fn is_executable_from_workspace(&self, workspace: &str) -> bool {
    match self.visibility() {
      Visibility::Public => true,
      Visibility::Private | Visibility::Internal => self.ctx.workspace == workspace,
      Visibility::Hidden => false,
    }
  }

  /// The declared environment of whichever kind spec is present.
  pub fn env(&self) -> Option<&ExecEnvironment> {
    if let Some(spec) = &self.exec {
      Some(&spec.env)
    } else if let Some(spec) = &self.serial {
      Some(&spec.env)
    } else if let Some(spec) = &self.parallel {
      Some(&spec.env)
    } else if let Some(spec) = &self.request {
      Some(&spec.env)
    } else if let Some(spec) = &self.render {
      Some(&spec.env)
    } else if let Some(spec) = &self.launch {
      Some(&spec.env)
    } else {
      None
    }
  }

  fn kind_count(&self) -> usize {
    [
      self.exec.is_some(),
      self.serial.is_some(),
      self.parallel.is_some(),
      self.request.is_some(),
      self.render.is_some(),
      self.launch.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count()
  }

  pub fn kind_name(&self) -> &'static str {
    if self.exec.is_some() {
      "exec"
    } else if self.serial.is_some() {
      "serial"
    } else if self.parallel.is_some() {
      "parallel"
    } else if self.request.is_some() {
      "request"
    } else if self.render.is_some() {
      "render"
    } else if self.launch.is_some() {
      "launch"
    } else {
      "none"
    }
  }

  pub fn validate(&self) -> Result<(), TypeError> {
    match self.kind_count() {
      0 => {
        return Err(TypeError::Validation {
          message: format!("executable '{}' declares no kind spec", self.id()),
        });
      }
      1 => {}
      n => {
        return Err(TypeError::Validation {
          message: format!("executable '{}' declares {n} kind specs, expected one", self.id()),
        });
      }
    }

    if let Some(spec) = &self.exec {
      match (spec.cmd.is_empty(), spec.file.is_empty()) {
        (true, true) => {
          return Err(TypeError::Validation {
            message: format!("executable '{}' must set either cmd or file", self.id()),
          });
        }
        (false, false) => {
          return Err(TypeError::Validation {
            message: format!("executable '{}' cannot set both cmd and file", self.id()),
          });
        }
        _ => {}
      }
    }

    for step in self.step_configs() {
      match (step.exec_ref.is_empty(), step.cmd.is_empty()) {
        (true, true) => {
          return Err(TypeError::Validation {
            message: format!("step in '{}' must set a ref or cmd", self.id()),
          });
        }
        (false, false) => {
          return Err(TypeError::Validation {
            message: format!("step in '{}' cannot set both ref and cmd", self.id()),
          });
        }
        _ => {}
      }
    }

    if let Some(env) = self.env() {
      for param in &env.params {
        param.validate()?;
      }
      for arg in &env.args {
        arg.validate()?;
      }
    }

    Ok(())
  }

  fn step_configs(&self) -> &[StepConfig] {
    if let Some(spec) = &self.serial {
      &spec.execs
    } else if let Some(spec) = &self.parallel {
      &spec.execs
    } else {
      &[]
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn command_executable(name: &str) -> Executable {
    let mut e = Executable {
      verb: Verb::Exec,
      name: name.to_string(),
      exec: Some(CommandSpec {
        cmd: "echo hello".to_string(),
        ..Default::default()
      }),
      ..Default::default()
    };
    e.set_context("ws", "/ws", "ns", "/ws/flowfile.yaml");
    e
  }

  #[test]
  fn reference_carries_context() {
    let e = command_executable("hello");
    assert_eq!(e.reference().to_string(), "exec ws/ns:hello");
    assert_eq!(e.flowfile_dir(), PathBuf::from("/ws"));
  }

  #[test]
  fn validate_requires_exactly_one_kind() {
    let mut e = command_executable("both");
    e.serial = Some(SerialSpec::default());
    assert!(e.validate().is_err());

    let empty = Executable {
      name: "nothing".to_string(),
      ..Default::default()
    };
    assert!(empty.validate().is_err());
  }

  #[test]
  fn validate_rejects_cmd_and_file() {
    let mut e = command_executable("clash");
    e.exec.as_mut().unwrap().file = "run.sh".to_string();
    assert!(e.validate().is_err());
  }

  #[test]
  fn validate_rejects_multiple_param_sources() {
    let mut e = command_executable("params");
    e.exec.as_mut().unwrap().env.params.push(Parameter {
      text: "value".to_string(),
      secret_ref: "vault:key".to_string(),
      env_key: "VAR".to_string(),
      ..Default::default()
    });
    assert!(e.validate().is_err());
  }

  #[test]
  fn output_file_may_combine_with_text() {
    let mut e = command_executable("outfile");
    e.exec.as_mut().unwrap().env.params.push(Parameter {
      text: "hello".to_string(),
      output_file: "t.txt".to_string(),
      ..Default::default()
    });
    assert!(e.validate().is_ok());
  }

  #[test]
  fn validate_rejects_step_with_ref_and_cmd() {
    let mut e = Executable {
      verb: Verb::Exec,
      name: "series".to_string(),
      serial: Some(SerialSpec {
        execs: vec![StepConfig {
          exec_ref: "exec other".to_string(),
          cmd: "echo no".to_string(),
          ..Default::default()
        }],
        ..Default::default()
      }),
      ..Default::default()
    };
    e.set_context("ws", "/ws", "ns", "/ws/flowfile.yaml");
    assert!(e.validate().is_err());
  }

  #[test]
  fn visibility_gates_workspace_execution() {
    let mut e = command_executable("vis");
    assert!(e.is_executable_from_workspace("ws"));
    assert!(!e.is_executable_from_workspace("other"));

    e.visibility = Some(Visibility::Public);
    assert!(e.is_executable_from_workspace("other"));

    e.visibility = Some(Visibility::Hidden);
    assert!(!e.is_executable_from_workspace("ws"));
  }

  #[test]
  fn argument_value_falls_back_to_default() {
    let mut arg = Argument {
      env_key: "PORT".to_string(),
      flag: "port".to_string(),
      default: Some("8080".to_string()),
      ..Default::default()
    };
    assert_eq!(arg.value(), Some("8080"));
    arg.set_value("9090");
    assert_eq!(arg.value(), Some("9090"));
  }
}
