//! Core data model for flowrun.
//!
//! Defines the executable model (verbs, references, kind specs, parameters,
//! arguments), the flowfile document format, declarative directory expansion,
//! and the on-disk user configuration.

pub mod common;
pub mod config;
pub mod directory;
pub mod error;
pub mod executable;
pub mod flowfile;
pub mod reference;
pub mod verb;
pub mod workspace;

pub use common::{Aliases, LogMode, Tags, Visibility};
pub use config::UserConfig;
pub use directory::Directory;
pub use error::TypeError;
pub use executable::{
  Argument, CommandSpec, ExecEnvironment, Executable, HttpMethod, LaunchSpec, Parameter,
  ParallelSpec, RenderSpec, RequestSpec, ResponseFileSpec, SaveFormat, SerialSpec, StepConfig,
};
pub use flowfile::FlowFile;
pub use reference::ExecutableRef;
pub use verb::Verb;
pub use workspace::Workspace;
