//! Flowfile documents.
//!
//! A flowfile is a workspace-scoped YAML document (`*.flow` or
//! `flowfile*.yaml`/`.yml`) with a top-level `executables` array. Parsing
//! binds each executable to its defining workspace, namespace, and file path.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{Tags, Visibility};
use crate::error::TypeError;
use crate::executable::Executable;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowFile {
  #[serde(default)]
  pub namespace: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub tags: Tags,
  #[serde(default)]
  pub visibility: Option<Visibility>,
  #[serde(default)]
  pub executables: Vec<Executable>,
}

impl FlowFile {
  /// Parse a flowfile document from YAML.
  pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(content)
  }

  /// Load a flowfile from disk and bind its executables to the workspace.
  pub fn load(
    path: &Path,
    workspace: &str,
    workspace_path: &Path,
  ) -> Result<Self, TypeError> {
    let content = std::fs::read_to_string(path).map_err(|e| TypeError::FlowFile {
      path: path.to_path_buf(),
      source: Box::new(e),
    })?;
    let mut flowfile = Self::parse(&content).map_err(|e| TypeError::FlowFile {
      path: path.to_path_buf(),
      source: Box::new(e),
    })?;
    flowfile.assign_context(workspace, workspace_path, path);
    Ok(flowfile)
  }

  /// Bind each executable to its origin. Entry-level namespaces override the
  /// flowfile-level namespace; file-level visibility applies when an entry
  /// declares none.
  pub fn assign_context(&mut self, workspace: &str, workspace_path: &Path, path: &Path) {
    for executable in &mut self.executables {
      let namespace = executable
        .namespace
        .clone()
        .unwrap_or_else(|| self.namespace.clone());
      executable.set_context(workspace, workspace_path, &namespace, path);
      if executable.visibility.is_none() {
        executable.visibility = self.visibility;
      }
    }
  }
}

/// Whether a path looks like a flowfile.
pub fn is_flowfile(path: &Path) -> bool {
  let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
    return false;
  };
  if name.ends_with(".flow") {
    return true;
  }
  name.starts_with("flowfile") && (name.ends_with(".yaml") || name.ends_with(".yml"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::verb::Verb;
  use std::path::PathBuf;

  const SAMPLE: &str = r#"
namespace: examples
executables:
  - verb: exec
    name: hello
    exec:
      cmd: echo hello
  - verb: build
    name: site
    namespace: docs
    serial:
      execs:
        - ref: exec hello
        - cmd: echo done
"#;

  #[test]
  fn parse_assigns_context() {
    let mut flowfile = FlowFile::parse(SAMPLE).unwrap();
    flowfile.assign_context("ws", Path::new("/ws"), Path::new("/ws/examples.flow"));

    let hello = &flowfile.executables[0];
    assert_eq!(hello.verb, Verb::Exec);
    assert_eq!(hello.namespace(), "examples");
    assert_eq!(hello.workspace(), "ws");
    assert_eq!(hello.flowfile_path(), Path::new("/ws/examples.flow"));

    let site = &flowfile.executables[1];
    assert_eq!(site.namespace(), "docs");
    assert_eq!(site.reference().to_string(), "build ws/docs:site");
  }

  #[test]
  fn executables_validate_after_parse() {
    let flowfile = FlowFile::parse(SAMPLE).unwrap();
    for executable in &flowfile.executables {
      executable.validate().unwrap();
    }
  }

  #[test]
  fn flowfile_name_matching() {
    assert!(is_flowfile(Path::new("/ws/build.flow")));
    assert!(is_flowfile(Path::new("/ws/flowfile.yaml")));
    assert!(is_flowfile(Path::new("/ws/flowfile-ci.yml")));
    assert!(!is_flowfile(Path::new("/ws/config.yaml")));
    assert!(!is_flowfile(PathBuf::from("/ws").as_path()));
  }
}
