//! Engine errors.

/// The error recorded for a single step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
  /// The step's gating condition could not be evaluated.
  #[error("condition evaluation failed: {message}")]
  Condition { message: String },

  /// The step function returned an error.
  #[error("{0}")]
  Failed(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The step was cancelled before it could complete.
  #[error("step cancelled")]
  Cancelled,
}

impl StepError {
  pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
    StepError::Failed(err.into())
  }
}
