//! Key-value store access.
//!
//! The store backend is external; conditions and inter-step state consult it
//! through `StoreReader`. Readers take a snapshot per access so a serial
//! step's condition observes writes made by earlier steps. Implementations
//! must not hold the backend open across calls.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::ContextError;

pub trait StoreReader: Send + Sync {
  /// A point-in-time view of all keys.
  fn snapshot(&self) -> Result<HashMap<String, String>, ContextError>;

  fn set(&self, key: &str, value: &str) -> Result<(), ContextError>;

  fn delete(&self, key: &str) -> Result<(), ContextError>;

  /// Drop all keys; used to clear run-scoped state after a root invocation.
  fn clear(&self) -> Result<(), ContextError>;
}

/// In-memory store used by tests and as a fallback backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
  data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StoreReader for MemoryStore {
  fn snapshot(&self) -> Result<HashMap<String, String>, ContextError> {
    Ok(self.data.lock().map_err(poisoned)?.clone())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), ContextError> {
    self
      .data
      .lock()
      .map_err(poisoned)?
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), ContextError> {
    self.data.lock().map_err(poisoned)?.remove(key);
    Ok(())
  }

  fn clear(&self) -> Result<(), ContextError> {
    self.data.lock().map_err(poisoned)?.clear();
    Ok(())
  }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> ContextError {
  ContextError::Store {
    message: "store lock poisoned".to_string(),
  }
}

/// File-backed store: a JSON map read and rewritten on every access.
///
/// Open-mutate-close per call keeps the file sharable across parallel steps
/// and child processes.
#[derive(Debug)]
pub struct FileStore {
  path: PathBuf,
}

impl FileStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  fn read(&self) -> Result<HashMap<String, String>, ContextError> {
    if !self.path.is_file() {
      return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(&self.path)?;
    if content.trim().is_empty() {
      return Ok(HashMap::new());
    }
    serde_json::from_str(&content).map_err(|e| ContextError::Store {
      message: format!("corrupt store file {}: {e}", self.path.display()),
    })
  }

  fn write(&self, data: &HashMap<String, String>) -> Result<(), ContextError> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(data).map_err(|e| ContextError::Store {
      message: format!("unable to serialize store: {e}"),
    })?;
    std::fs::write(&self.path, content)?;
    Ok(())
  }
}

impl StoreReader for FileStore {
  fn snapshot(&self) -> Result<HashMap<String, String>, ContextError> {
    self.read()
  }

  fn set(&self, key: &str, value: &str) -> Result<(), ContextError> {
    let mut data = self.read()?;
    data.insert(key.to_string(), value.to_string());
    self.write(&data)
  }

  fn delete(&self, key: &str) -> Result<(), ContextError> {
    let mut data = self.read()?;
    data.remove(key);
    self.write(&data)
  }

  fn clear(&self) -> Result<(), ContextError> {
    self.write(&HashMap::new())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn memory_store_snapshot_isolated() {
    let store = MemoryStore::new();
    store.set("X", "1").unwrap();
    let snap = store.snapshot().unwrap();
    store.set("X", "2").unwrap();
    assert_eq!(snap.get("X"), Some(&"1".to_string()));
    assert_eq!(store.snapshot().unwrap().get("X"), Some(&"2".to_string()));
  }

  #[test]
  fn file_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("store.json"));

    assert!(store.snapshot().unwrap().is_empty());
    store.set("key", "value").unwrap();
    assert_eq!(
      store.snapshot().unwrap().get("key"),
      Some(&"value".to_string())
    );

    store.delete("key").unwrap();
    assert!(store.snapshot().unwrap().is_empty());

    store.set("a", "1").unwrap();
    store.clear().unwrap();
    assert!(store.snapshot().unwrap().is_empty());
  }
}
