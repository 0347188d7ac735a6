//! Step and summary types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::StepError;

/// Error type produced by step functions and conditions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A step function; invoked once per attempt, so it must be re-callable for
/// retries. The token is cancelled when the step's batch is cancelled
/// (fail-fast sibling failure, batch timeout, or outer cancellation); the
/// function must stop its work best-effort when it fires.
pub type StepFn =
  Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A gating condition, evaluated immediately before the step would run.
pub type ConditionFn = Box<dyn Fn() -> Result<bool, BoxError> + Send + Sync>;

/// One schedulable unit handed to the engine.
pub struct Step {
  pub id: String,
  pub function: StepFn,
  pub condition: Option<ConditionFn>,
  /// Additional attempts after the first failure.
  pub max_retries: u32,
}

impl Step {
  pub fn new(id: impl Into<String>, function: StepFn) -> Self {
    Self {
      id: id.into(),
      function,
      condition: None,
      max_retries: 0,
    }
  }
}

impl fmt::Debug for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Step")
      .field("id", &self.id)
      .field("has_condition", &self.condition.is_some())
      .field("max_retries", &self.max_retries)
      .finish()
  }
}

/// Scheduling mode for a batch of steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Serial,
  Parallel,
}

/// Options controlling one `execute` call.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
  pub mode: Mode,
  /// Unset behaves as false.
  pub fail_fast: Option<bool>,
  /// Parallel concurrency bound; 0 means unlimited up to the step count.
  pub max_threads: usize,
  /// Deadline for the whole batch; on expiry the batch context is cancelled
  /// and remaining steps settle as cancelled or never start.
  pub timeout: Option<Duration>,
}

impl ExecuteOptions {
  pub fn serial() -> Self {
    Self {
      mode: Mode::Serial,
      fail_fast: None,
      max_threads: 0,
      timeout: None,
    }
  }

  pub fn parallel() -> Self {
    Self {
      mode: Mode::Parallel,
      fail_fast: None,
      max_threads: 0,
      timeout: None,
    }
  }

  pub fn with_fail_fast(mut self, fail_fast: Option<bool>) -> Self {
    self.fail_fast = fail_fast;
    self
  }

  pub fn with_max_threads(mut self, max_threads: usize) -> Self {
    self.max_threads = max_threads;
    self
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub(crate) fn fail_fast_enabled(&self) -> bool {
    self.fail_fast.unwrap_or(false)
  }
}

/// Outcome of one step slot.
///
/// In parallel mode the summary always holds one slot per step; slots of
/// steps that never ran (skipped, or prevented by fail-fast) stay zero-valued
/// with an empty ID.
#[derive(Debug, Default)]
pub struct StepResult {
  pub id: String,
  pub error: Option<StepError>,
}

impl StepResult {
  pub fn is_zero(&self) -> bool {
    self.id.is_empty() && self.error.is_none()
  }
}

/// The engine's report for one `execute` call.
#[derive(Debug, Default)]
pub struct Summary {
  pub results: Vec<StepResult>,
}

impl Summary {
  pub fn has_errors(&self) -> bool {
    self.results.iter().any(|r| r.error.is_some())
  }

  /// A single aggregated message listing every failed step.
  pub fn error_message(&self) -> String {
    let failures: Vec<String> = self
      .results
      .iter()
      .filter_map(|r| {
        r.error.as_ref().map(|e| {
          if r.id.is_empty() {
            e.to_string()
          } else {
            format!("{}: {e}", r.id)
          }
        })
      })
      .collect();
    failures.join("; ")
  }
}

/// Exponential retry backoff with a cap.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl BackoffPolicy {
  /// Delay before retry `attempt` (0-indexed).
  pub fn delay(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }
}

impl Default for BackoffPolicy {
  fn default() -> Self {
    Self {
      base_delay: Duration::from_millis(250),
      max_delay: Duration::from_secs(5),
    }
  }
}

/// The scheduling interface consumed by composite runners.
///
/// Implemented by `ExecEngine`; mocked in composer tests.
#[async_trait]
pub trait Engine: Send + Sync {
  async fn execute(
    &self,
    cancel: CancellationToken,
    steps: Vec<Step>,
    options: ExecuteOptions,
  ) -> Summary;
}
