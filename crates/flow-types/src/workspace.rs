//! Workspace configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::Tags;
use crate::error::TypeError;

const WORKSPACE_CONFIG_FILES: &[&str] = &["flow.yaml", "flow.yml"];

/// A registered workspace: a named directory holding flowfiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub tags: Tags,
  /// Env files loaded into the input env before every run in this workspace.
  #[serde(default)]
  pub env_files: Vec<String>,

  #[serde(skip)]
  name: String,
  #[serde(skip)]
  location: PathBuf,
}

impl Workspace {
  /// Load the workspace config from its directory; a missing config file
  /// yields an empty config bound to the location.
  pub fn load(name: &str, location: &Path) -> Result<Self, TypeError> {
    let mut workspace = Self::default();
    for file in WORKSPACE_CONFIG_FILES {
      let path = location.join(file);
      if path.is_file() {
        let content = std::fs::read_to_string(&path)?;
        workspace = serde_yaml::from_str(&content).map_err(|e| TypeError::Config {
          path,
          source: Box::new(e),
        })?;
        break;
      }
    }
    workspace.name = name.to_string();
    workspace.location = location.to_path_buf();
    Ok(workspace)
  }

  pub fn assigned_name(&self) -> &str {
    &self.name
  }

  pub fn location(&self) -> &Path {
    &self.location
  }
}
