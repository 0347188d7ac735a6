//! Environment resolution.
//!
//! Transforms an executable's declared parameters and arguments, the
//! caller-provided input env, and the injected defaults into the final
//! environment map for one step, materializing file-shaped inputs to disk
//! along the way.

pub mod args;
pub mod error;
pub mod params;
pub mod resolver;

pub use error::EnvError;
pub use resolver::{
  build_env_map, create_temp_env_files, default_env, env_map_to_list, load_env_from_files,
  read_dot_env_file, DISABLE_INTERACTIVE_ENV,
};
