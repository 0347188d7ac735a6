//! Injected lookup interfaces.
//!
//! The execution core does not own discovery, caching, or secret storage.
//! It consumes these read interfaces; the CLI layer supplies implementations.

use std::sync::Arc;

use flow_types::{Executable, ExecutableRef, Workspace};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
  #[error("{reference} executable not found")]
  ExecutableNotFound { reference: String },

  #[error("workspace {workspace} not found")]
  WorkspaceNotFound { workspace: String },

  #[error("secret '{key}' not found in vault '{vault}'")]
  SecretNotFound { vault: String, key: String },

  #[error("vault '{vault}' is unavailable: {message}")]
  VaultUnavailable { vault: String, message: String },

  #[error("cache refresh failed: {message}")]
  CacheRefresh { message: String },
}

impl LookupError {
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      LookupError::ExecutableNotFound { .. }
        | LookupError::WorkspaceNotFound { .. }
        | LookupError::SecretNotFound { .. }
    )
  }
}

/// Read access to the executable definition cache.
pub trait ExecutableLookup: Send + Sync {
  /// Look up a fully-expanded reference.
  fn get(&self, reference: &ExecutableRef) -> Result<Arc<Executable>, LookupError>;

  /// Force a cache rebuild; used once before retrying a missed lookup.
  fn refresh(&self) -> Result<(), LookupError>;
}

/// Read access to vault secrets. The vault is opened on demand per call.
pub trait SecretLookup: Send + Sync {
  fn get_secret(&self, vault: &str, key: &str) -> Result<String, LookupError>;
}

/// Read access to registered workspaces.
pub trait WorkspaceLookup: Send + Sync {
  fn get(&self, name: &str) -> Result<Workspace, LookupError>;
}
