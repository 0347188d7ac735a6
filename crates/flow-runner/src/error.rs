//! Runner errors.

use flow_context::{ContextError, LookupError};
use flow_env::EnvError;
use flow_types::TypeError;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  #[error("compatible runner not found for executable {id}")]
  CompatibleRunnerNotFound { id: String },

  #[error("timeout after {:?}", .duration)]
  Timeout { duration: std::time::Duration },

  /// Child command exited non-zero; the original code is surfaced.
  #[error("command exited with non-zero status {code}")]
  ExitStatus { code: i32 },

  #[error("unexpected status code {status} for {url}")]
  UnexpectedStatusCode { status: u16, url: String },

  #[error("request transport error")]
  Transport(#[source] reqwest::Error),

  #[error("expression evaluation failed: {message}")]
  Expression { message: String },

  #[error("template error: {message}")]
  Template { message: String },

  #[error("{message}")]
  Validation { message: String },

  /// Aggregated step failures from a composite run.
  #[error("{message}")]
  StepsFailed { message: String },

  #[error("execution cancelled")]
  Cancelled,

  #[error("unable to set parameters to env")]
  Env(#[source] EnvError),

  #[error(transparent)]
  Lookup(#[from] LookupError),

  #[error(transparent)]
  Type(#[from] TypeError),

  #[error(transparent)]
  Context(#[from] ContextError),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl RunnerError {
  pub fn validation(message: impl Into<String>) -> Self {
    RunnerError::Validation {
      message: message.into(),
    }
  }
}
