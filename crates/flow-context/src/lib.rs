//! Process-scoped execution state.
//!
//! The `ExecutionContext` is created when a root invocation begins and
//! finalized once the root runner returns. It owns the cancellation tree,
//! the shared per-process temp directory, the LIFO cleanup callbacks, and
//! the injected lookup interfaces consumed by the core.

pub mod context;
pub mod error;
pub mod lookup;
pub mod store;

pub use context::{ContextBuilder, ExecutionContext};
pub use error::ContextError;
pub use lookup::{ExecutableLookup, LookupError, SecretLookup, WorkspaceLookup};
pub use store::{FileStore, MemoryStore, StoreReader};
