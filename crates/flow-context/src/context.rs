//! The execution context.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use flow_types::{Executable, UserConfig, Workspace};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::ContextError;
use crate::lookup::{ExecutableLookup, LookupError, SecretLookup, WorkspaceLookup};
use crate::store::{MemoryStore, StoreReader};

type Callback = Box<dyn FnOnce() -> Result<(), ContextError> + Send>;

/// Process-scoped state shared by every runner in a root invocation.
///
/// Created when the invocation begins, finalized once the root runner
/// returns. Finalization runs cleanup callbacks in reverse registration
/// order and removes the per-process temp directory.
pub struct ExecutionContext {
  pub execution_id: String,
  pub config: UserConfig,
  pub current_workspace: Workspace,
  pub current_namespace: String,

  cancel: CancellationToken,
  root_executable: RwLock<Option<Arc<Executable>>>,
  process_tmp_dir: Mutex<Option<PathBuf>>,
  callbacks: Mutex<Vec<Callback>>,

  pub executables: Arc<dyn ExecutableLookup>,
  pub secrets: Arc<dyn SecretLookup>,
  pub workspaces: Arc<dyn WorkspaceLookup>,
  pub store: Arc<dyn StoreReader>,
}

impl ExecutionContext {
  pub fn builder() -> ContextBuilder {
    ContextBuilder::default()
  }

  /// A token cancelled when this invocation is cancelled.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// A child token for a subtree of the run.
  pub fn child_token(&self) -> CancellationToken {
    self.cancel.child_token()
  }

  /// Cancel this invocation and all descendants.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Record the root executable; only the first caller wins.
  pub fn set_root_executable(&self, executable: Arc<Executable>) {
    let mut root = self.root_executable.write().unwrap_or_else(|e| e.into_inner());
    if root.is_none() {
      *root = Some(executable);
    }
  }

  pub fn root_executable(&self) -> Option<Arc<Executable>> {
    self.root_executable.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// The shared per-process temp directory, if one has been allocated.
  pub fn process_tmp_dir(&self) -> Option<PathBuf> {
    self.process_tmp_dir.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Record the temp directory; allocated at most once per invocation, so
  /// later calls are ignored.
  pub fn set_process_tmp_dir(&self, dir: PathBuf) {
    let mut tmp = self.process_tmp_dir.lock().unwrap_or_else(|e| e.into_inner());
    if tmp.is_none() {
      *tmp = Some(dir);
    }
  }

  /// Register a cleanup callback; callbacks run LIFO during finalize.
  pub fn add_callback(&self, callback: Callback) {
    self
      .callbacks
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(callback);
  }

  /// The `workspace/namespace` scope label.
  pub fn scope(&self) -> String {
    let ws = match self.current_workspace.assigned_name() {
      "" => "unk",
      name => name,
    };
    let ns = match self.current_namespace.as_str() {
      "" => "*",
      ns => ns,
    };
    format!("{ws}/{ns}")
  }

  /// Run cleanup callbacks in reverse registration order, then delete the
  /// temp directory. Callback errors are logged and do not stop later
  /// callbacks.
  pub fn finalize(&self) {
    let callbacks: Vec<Callback> = {
      let mut guard = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
      guard.drain(..).collect()
    };
    for callback in callbacks.into_iter().rev() {
      if let Err(e) = callback() {
        error!(error = %e, "callback execution error");
      }
    }

    let tmp = self.process_tmp_dir.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(dir) = tmp {
      debug!(dir = %dir.display(), "removing process temp directory");
      if let Err(e) = std::fs::remove_dir_all(&dir) {
        error!(error = %e, dir = %dir.display(), "unable to remove temp dir");
      }
    }
  }
}

/// Builder for `ExecutionContext`.
///
/// Lookups default to empty implementations and an in-memory store so tests
/// can construct a context without wiring the full CLI stack.
pub struct ContextBuilder {
  config: UserConfig,
  current_workspace: Workspace,
  current_namespace: String,
  executables: Option<Arc<dyn ExecutableLookup>>,
  secrets: Option<Arc<dyn SecretLookup>>,
  workspaces: Option<Arc<dyn WorkspaceLookup>>,
  store: Option<Arc<dyn StoreReader>>,
  cancel: Option<CancellationToken>,
}

impl Default for ContextBuilder {
  fn default() -> Self {
    Self {
      config: UserConfig::default(),
      current_workspace: Workspace::default(),
      current_namespace: String::new(),
      executables: None,
      secrets: None,
      workspaces: None,
      store: None,
      cancel: None,
    }
  }
}

impl ContextBuilder {
  pub fn config(mut self, config: UserConfig) -> Self {
    self.config = config;
    self
  }

  pub fn workspace(mut self, workspace: Workspace) -> Self {
    self.current_workspace = workspace;
    self
  }

  pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
    self.current_namespace = namespace.into();
    self
  }

  pub fn executables(mut self, lookup: Arc<dyn ExecutableLookup>) -> Self {
    self.executables = Some(lookup);
    self
  }

  pub fn secrets(mut self, lookup: Arc<dyn SecretLookup>) -> Self {
    self.secrets = Some(lookup);
    self
  }

  pub fn workspaces(mut self, lookup: Arc<dyn WorkspaceLookup>) -> Self {
    self.workspaces = Some(lookup);
    self
  }

  pub fn store(mut self, store: Arc<dyn StoreReader>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }

  pub fn build(self) -> Arc<ExecutionContext> {
    let empty = Arc::new(EmptyLookup);
    Arc::new(ExecutionContext {
      execution_id: uuid::Uuid::new_v4().to_string(),
      config: self.config,
      current_workspace: self.current_workspace,
      current_namespace: self.current_namespace,
      cancel: self.cancel.unwrap_or_default(),
      root_executable: RwLock::new(None),
      process_tmp_dir: Mutex::new(None),
      callbacks: Mutex::new(Vec::new()),
      executables: self.executables.unwrap_or_else(|| empty.clone()),
      secrets: self.secrets.unwrap_or_else(|| empty.clone()),
      workspaces: self.workspaces.unwrap_or(empty),
      store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
    })
  }
}

/// Lookup that resolves nothing; the builder default.
struct EmptyLookup;

impl ExecutableLookup for EmptyLookup {
  fn get(
    &self,
    reference: &flow_types::ExecutableRef,
  ) -> Result<Arc<Executable>, LookupError> {
    Err(LookupError::ExecutableNotFound {
      reference: reference.to_string(),
    })
  }

  fn refresh(&self) -> Result<(), LookupError> {
    Ok(())
  }
}

impl SecretLookup for EmptyLookup {
  fn get_secret(&self, vault: &str, key: &str) -> Result<String, LookupError> {
    Err(LookupError::SecretNotFound {
      vault: vault.to_string(),
      key: key.to_string(),
    })
  }
}

impl WorkspaceLookup for EmptyLookup {
  fn get(&self, name: &str) -> Result<Workspace, LookupError> {
    Err(LookupError::WorkspaceNotFound {
      workspace: name.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn callbacks_run_in_reverse_order() {
    let ctx = ExecutionContext::builder().build();
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
      let order = order.clone();
      ctx.add_callback(Box::new(move || {
        order.lock().unwrap().push(i);
        Ok(())
      }));
    }

    ctx.finalize();
    assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
  }

  #[test]
  fn callback_errors_do_not_stop_later_callbacks() {
    let ctx = ExecutionContext::builder().build();
    let count = Arc::new(AtomicUsize::new(0));

    let c = count.clone();
    ctx.add_callback(Box::new(move || {
      c.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }));
    ctx.add_callback(Box::new(|| {
      Err(ContextError::Cleanup {
        message: "boom".to_string(),
      })
    }));

    ctx.finalize();
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn tmp_dir_is_set_once() {
    let ctx = ExecutionContext::builder().build();
    ctx.set_process_tmp_dir(PathBuf::from("/tmp/a"));
    ctx.set_process_tmp_dir(PathBuf::from("/tmp/b"));
    assert_eq!(ctx.process_tmp_dir(), Some(PathBuf::from("/tmp/a")));
  }

  #[test]
  fn finalize_removes_tmp_dir() {
    let ctx = ExecutionContext::builder().build();
    let dir = tempfile::tempdir().unwrap().into_path();
    std::fs::write(dir.join("leftover.txt"), "x").unwrap();
    ctx.set_process_tmp_dir(dir.clone());

    ctx.finalize();
    assert!(!dir.exists());
  }

  #[test]
  fn scope_falls_back_for_empty_parts() {
    let ctx = ExecutionContext::builder().build();
    assert_eq!(ctx.scope(), "unk/*");
  }

  #[test]
  fn root_executable_set_once() {
    let ctx = ExecutionContext::builder().build();
    let mut first = Executable::default();
    first.name = "first".to_string();
    let first = Arc::new(first);
    let mut second = Executable::default();
    second.name = "second".to_string();
    let second = Arc::new(second);
    ctx.set_root_executable(first);
    ctx.set_root_executable(second);
    assert_eq!(ctx.root_executable().unwrap().name, "first");
  }

  #[test]
  fn cancellation_propagates_to_children() {
    let ctx = ExecutionContext::builder().build();
    let child = ctx.child_token();
    assert!(!child.is_cancelled());
    ctx.cancel();
    assert!(child.is_cancelled());
  }
}
