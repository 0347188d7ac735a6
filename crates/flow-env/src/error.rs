//! Env resolution errors.

use flow_context::LookupError;

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
  #[error("env key {key} not found in env file {file}")]
  EnvFileKeyMissing { key: String, file: String },

  #[error("failed to read env file {file}: {message}")]
  EnvFileUnreadable { file: String, message: String },

  #[error("failed to get value for parameter '{env_key}': {message}")]
  Parameter { env_key: String, message: String },

  #[error(transparent)]
  Secret(#[from] LookupError),

  #[error("missing value for argument(s): {env_keys}")]
  UnresolvedArguments { env_keys: String },

  #[error("failed to create temp file for '{destination}': {message}")]
  TempFile {
    destination: String,
    message: String,
  },

  /// Several resolution failures reported together.
  #[error("failed to resolve environment: {}", join_errors(.0))]
  Aggregate(Vec<EnvError>),
}

fn join_errors(errors: &[EnvError]) -> String {
  errors
    .iter()
    .map(|e| e.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}

impl EnvError {
  /// Wrap a non-empty error list, flattening the single-error case.
  pub fn aggregate(mut errors: Vec<EnvError>) -> EnvError {
    if errors.len() == 1 {
      errors.remove(0)
    } else {
      EnvError::Aggregate(errors)
    }
  }
}
