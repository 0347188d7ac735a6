//! Per-user configuration.
//!
//! The config file lives at `<config dir>/config.yaml`; the directory is
//! `$FLOW_CONFIG_PATH` when set, otherwise the platform config directory.
//! Cached data (the executable cache, the store) lives under
//! `$FLOW_CACHE_PATH` or the platform cache directory.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::LogMode;
use crate::error::TypeError;

pub const CONFIG_PATH_ENV: &str = "FLOW_CONFIG_PATH";
pub const CACHE_PATH_ENV: &str = "FLOW_CACHE_PATH";

const CONFIG_FILE: &str = "config.yaml";
const APP_DIR: &str = "flowrun";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
  #[serde(default)]
  pub current_workspace: String,
  #[serde(default)]
  pub current_namespace: String,
  /// Registered workspaces, name to path.
  #[serde(default)]
  pub workspaces: HashMap<String, PathBuf>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_log_mode: Option<LogMode>,
  /// Applied to command executables that declare no timeout.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_timeout_ms: Option<u64>,
  #[serde(default)]
  pub current_vault: String,
  #[serde(default)]
  pub interactive: Option<InteractiveConfig>,
  #[serde(default)]
  pub theme: String,
}

impl UserConfig {
  /// Load from the default location.
  pub fn load() -> Result<Self, TypeError> {
    Self::load_from(&config_dir_path().join(CONFIG_FILE))
  }

  pub fn load_from(path: &PathBuf) -> Result<Self, TypeError> {
    let content = std::fs::read_to_string(path).map_err(|e| TypeError::Config {
      path: path.clone(),
      source: Box::new(e),
    })?;
    serde_yaml::from_str(&content).map_err(|e| TypeError::Config {
      path: path.clone(),
      source: Box::new(e),
    })
  }

  pub fn current_workspace_path(&self) -> Option<&PathBuf> {
    self.workspaces.get(&self.current_workspace)
  }

  pub fn current_vault_name(&self) -> &str {
    &self.current_vault
  }

  pub fn interactive_enabled(&self) -> bool {
    self.interactive.as_ref().map(|i| i.enabled).unwrap_or(true)
  }

  pub fn default_log_mode(&self) -> LogMode {
    self.default_log_mode.unwrap_or_default()
  }
}

/// Directory holding the user config file.
pub fn config_dir_path() -> PathBuf {
  if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
    if !path.is_empty() {
      return PathBuf::from(path);
    }
  }
  dirs::config_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(APP_DIR)
}

/// Directory holding cached data (executable cache, store).
pub fn cache_dir_path() -> PathBuf {
  if let Ok(path) = std::env::var(CACHE_PATH_ENV) {
    if !path.is_empty() {
      return PathBuf::from(path);
    }
  }
  dirs::cache_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(APP_DIR)
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
currentWorkspace: home
currentNamespace: dev
workspaces:
  home: /tmp/ws-home
defaultLogMode: json
currentVault: personal
interactive:
  enabled: false
"#;

  #[test]
  fn parse_config() {
    let config: UserConfig = serde_yaml::from_str(SAMPLE).unwrap();
    assert_eq!(config.current_workspace, "home");
    assert_eq!(config.current_namespace, "dev");
    assert_eq!(config.default_log_mode(), LogMode::Json);
    assert_eq!(config.current_vault_name(), "personal");
    assert!(!config.interactive_enabled());
    assert_eq!(
      config.current_workspace_path(),
      Some(&PathBuf::from("/tmp/ws-home"))
    );
  }

  #[test]
  fn interactive_defaults_to_enabled() {
    let config = UserConfig::default();
    assert!(config.interactive_enabled());
    assert_eq!(config.default_log_mode(), LogMode::Text);
  }

  #[test]
  fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, SAMPLE).unwrap();
    let config = UserConfig::load_from(&path).unwrap();
    assert_eq!(config.current_workspace, "home");
  }
}
