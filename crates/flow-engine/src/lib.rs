//! The step execution engine.
//!
//! An engine takes a batch of prepared steps and runs them serially or in
//! parallel with fail-fast, bounded concurrency, per-step gating conditions,
//! and per-step retry budgets. The engine is the sole scheduler in the
//! system; composite runners hand it fully-formed step lists.

pub mod engine;
pub mod error;
pub mod step;

pub use engine::ExecEngine;
pub use error::StepError;
pub use step::{
  BackoffPolicy, BoxError, ConditionFn, Engine, ExecuteOptions, Mode, Step, StepFn, StepResult,
  Summary,
};
