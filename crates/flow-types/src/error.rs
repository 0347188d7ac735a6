//! Model errors.

use std::path::PathBuf;

/// Errors produced while parsing or validating model types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
  /// Unknown verb string.
  #[error("invalid verb '{verb}'")]
  InvalidVerb { verb: String },

  /// Malformed executable reference.
  #[error("invalid executable reference '{reference}'")]
  InvalidRef { reference: String },

  /// Executable definition failed validation.
  #[error("invalid executable definition: {message}")]
  Validation { message: String },

  /// Directory expansion failed.
  #[error("unable to expand directory '{directory}': {message}")]
  DirectoryExpansion { directory: String, message: String },

  /// Flowfile could not be read or parsed.
  #[error("unable to load flowfile {path}")]
  FlowFile {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// User config could not be read or parsed.
  #[error("unable to load config {path}")]
  Config {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error(transparent)]
  Io(#[from] std::io::Error),
}
