//! Context errors.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
  /// A cleanup callback failed during finalize.
  #[error("cleanup callback failed: {message}")]
  Cleanup { message: String },

  /// Store backend failure.
  #[error("store error: {message}")]
  Store { message: String },

  #[error("unable to remove {path}")]
  TempDirRemoval {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}
