//! File-backed vault access.
//!
//! Each vault is a YAML map of secret names to values under
//! `<cache dir>/vaults/<name>.yaml`. The file is opened per lookup and
//! released immediately; nothing stays open across steps.

use std::collections::HashMap;
use std::path::PathBuf;

use flow_context::{LookupError, SecretLookup};
use flow_types::config::cache_dir_path;

pub struct FileVault {
  vaults_dir: PathBuf,
}

impl FileVault {
  pub fn new() -> Self {
    Self {
      vaults_dir: cache_dir_path().join("vaults"),
    }
  }

  #[cfg(test)]
  fn with_dir(vaults_dir: PathBuf) -> Self {
    Self { vaults_dir }
  }
}

impl SecretLookup for FileVault {
  fn get_secret(&self, vault: &str, key: &str) -> Result<String, LookupError> {
    if vault.is_empty() {
      return Err(LookupError::VaultUnavailable {
        vault: vault.to_string(),
        message: "no vault selected".to_string(),
      });
    }

    let path = self.vaults_dir.join(format!("{vault}.yaml"));
    let content =
      std::fs::read_to_string(&path).map_err(|e| LookupError::VaultUnavailable {
        vault: vault.to_string(),
        message: format!("unable to read {}: {e}", path.display()),
      })?;
    let secrets: HashMap<String, String> =
      serde_yaml::from_str(&content).map_err(|e| LookupError::VaultUnavailable {
        vault: vault.to_string(),
        message: format!("unable to parse {}: {e}", path.display()),
      })?;

    secrets
      .get(key)
      .cloned()
      .ok_or_else(|| LookupError::SecretNotFound {
        vault: vault.to_string(),
        key: key.to_string(),
      })
  }
}
