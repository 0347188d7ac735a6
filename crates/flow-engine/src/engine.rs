//! The default engine implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StepError;
use crate::step::{BackoffPolicy, Engine, ExecuteOptions, Mode, Step, StepResult, Summary};

/// The production engine.
///
/// Serial batches run in declaration order; conditions are evaluated at the
/// moment a step is considered so they observe earlier steps' side effects.
/// Parallel batches fan out over a semaphore-bounded set of tasks; fail-fast
/// cancels the group so queued steps never start, while in-flight steps run
/// to completion and record their result.
pub struct ExecEngine {
  backoff: BackoffPolicy,
}

impl ExecEngine {
  pub fn new() -> Self {
    Self {
      backoff: BackoffPolicy::default(),
    }
  }

  pub fn with_backoff(backoff: BackoffPolicy) -> Self {
    Self { backoff }
  }

  async fn execute_serial(
    &self,
    cancel: CancellationToken,
    steps: Vec<Step>,
    options: &ExecuteOptions,
  ) -> Summary {
    let fail_fast = options.fail_fast_enabled();
    let mut results = Vec::new();

    for step in steps {
      if cancel.is_cancelled() {
        results.push(StepResult {
          id: step.id,
          error: Some(StepError::Cancelled),
        });
        break;
      }

      if let Some(condition) = &step.condition {
        match condition() {
          Err(e) => {
            debug!(step = %step.id, error = %e, "condition evaluation failed");
            results.push(StepResult {
              id: step.id,
              error: Some(StepError::Condition {
                message: e.to_string(),
              }),
            });
            if fail_fast {
              break;
            }
            continue;
          }
          Ok(false) => {
            debug!(step = %step.id, "condition is false, skipping");
            continue;
          }
          Ok(true) => {}
        }
      }

      let error = run_step(&step, &cancel, &self.backoff).await.err();
      let failed = error.is_some();
      results.push(StepResult {
        id: step.id,
        error,
      });
      if failed && fail_fast {
        break;
      }
    }

    Summary { results }
  }

  async fn execute_parallel(
    &self,
    cancel: CancellationToken,
    steps: Vec<Step>,
    options: &ExecuteOptions,
  ) -> Summary {
    let n = steps.len();
    let fail_fast = options.fail_fast_enabled();
    let limit = if options.max_threads > 0 {
      options.max_threads
    } else {
      n.max(1)
    };

    let semaphore = Arc::new(Semaphore::new(limit));
    let group = cancel.child_token();
    let results: Arc<Mutex<Vec<StepResult>>> =
      Arc::new(Mutex::new((0..n).map(|_| StepResult::default()).collect()));

    let mut handles = Vec::with_capacity(n);
    for (slot, step) in steps.into_iter().enumerate() {
      let semaphore = semaphore.clone();
      let group = group.clone();
      let results = results.clone();
      let backoff = self.backoff.clone();

      handles.push(tokio::spawn(async move {
        let _permit = tokio::select! {
          permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
          },
          _ = group.cancelled() => return,
        };
        if group.is_cancelled() {
          // Prevented by fail-fast; the slot stays zero-valued.
          return;
        }

        if let Some(condition) = &step.condition {
          match condition() {
            Err(e) => {
              debug!(step = %step.id, error = %e, "condition evaluation failed");
              record(
                &results,
                slot,
                step.id.clone(),
                Some(StepError::Condition {
                  message: e.to_string(),
                }),
              );
              if fail_fast {
                group.cancel();
              }
              return;
            }
            Ok(false) => {
              debug!(step = %step.id, "condition is false, skipping");
              return;
            }
            Ok(true) => {}
          }
        }

        let error = run_step(&step, &group, &backoff).await.err();
        let failed = error.is_some();
        record(&results, slot, step.id.clone(), error);
        if failed && fail_fast {
          group.cancel();
        }
      }));
    }

    futures::future::join_all(handles).await;

    let results = match Arc::try_unwrap(results) {
      Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
      Err(shared) => std::mem::take(
        &mut *shared.lock().unwrap_or_else(|e| e.into_inner()),
      ),
    };
    Summary { results }
  }
}

impl Default for ExecEngine {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Engine for ExecEngine {
  async fn execute(
    &self,
    cancel: CancellationToken,
    steps: Vec<Step>,
    options: ExecuteOptions,
  ) -> Summary {
    // The guard stops the timer task once the batch settles.
    let mut _timer_guard = None;
    let cancel = match options.timeout {
      Some(duration) => {
        let deadline = cancel.child_token();
        let timer = deadline.clone();
        tokio::spawn(async move {
          tokio::select! {
            _ = tokio::time::sleep(duration) => timer.cancel(),
            _ = timer.cancelled() => {}
          }
        });
        _timer_guard = Some(deadline.clone().drop_guard());
        deadline
      }
      None => cancel,
    };

    match options.mode {
      Mode::Serial => self.execute_serial(cancel, steps, &options).await,
      Mode::Parallel => self.execute_parallel(cancel, steps, &options).await,
    }
  }
}

fn record(
  results: &Arc<Mutex<Vec<StepResult>>>,
  slot: usize,
  id: String,
  error: Option<StepError>,
) {
  let mut guard = results.lock().unwrap_or_else(|e| e.into_inner());
  guard[slot] = StepResult { id, error };
}

/// Invoke a step function with its retry budget.
///
/// Retries are only attempted while the context is not cancelled; the
/// backoff sleep is abandoned on cancellation.
async fn run_step(
  step: &Step,
  cancel: &CancellationToken,
  backoff: &BackoffPolicy,
) -> Result<(), StepError> {
  let mut attempt: u32 = 0;
  loop {
    match (step.function)(cancel.clone()).await {
      Ok(()) => return Ok(()),
      Err(e) => {
        if attempt >= step.max_retries || cancel.is_cancelled() {
          return Err(StepError::Failed(e));
        }
        let delay = backoff.delay(attempt);
        debug!(
          step = %step.id,
          attempt = attempt + 1,
          delay_ms = delay.as_millis() as u64,
          "retrying step"
        );
        tokio::select! {
          _ = tokio::time::sleep(delay) => {}
          _ = cancel.cancelled() => return Err(StepError::Failed(e)),
        }
        attempt += 1;
      }
    }
  }
}
