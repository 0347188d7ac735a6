//! Runner dispatch and the kind-specific runners.
//!
//! A `Runner` knows how to execute one kind of executable. Runners register
//! into a process-wide ordered list before any execution begins; the
//! dispatcher picks the first compatible runner and enforces the
//! per-executable timeout. Composite runners (serial, parallel) expand their
//! children into engine steps and re-enter the dispatcher recursively.

pub mod dispatch;
pub mod error;
pub mod expr;
pub mod launch;
pub mod parallel;
pub mod render;
pub mod request;
pub mod serial;
pub mod shell;

mod command;
mod composer;

pub use command::CommandRunner;
pub use dispatch::{exec, register_runner, reset, resolve_executable, Runner};
pub use error::RunnerError;
pub use launch::LaunchRunner;
pub use parallel::ParallelRunner;
pub use render::RenderRunner;
pub use request::RequestRunner;
pub use serial::SerialRunner;

/// Register the full default runner set.
pub fn register_default_runners() {
  register_runner(std::sync::Arc::new(CommandRunner));
  register_runner(std::sync::Arc::new(LaunchRunner));
  register_runner(std::sync::Arc::new(RequestRunner));
  register_runner(std::sync::Arc::new(RenderRunner));
  register_runner(std::sync::Arc::new(SerialRunner));
  register_runner(std::sync::Arc::new(ParallelRunner));
}
