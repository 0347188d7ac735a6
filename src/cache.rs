//! Filesystem-backed executable cache.
//!
//! Scans every registered workspace for flowfiles and indexes executables by
//! their canonical reference (aliases included). `refresh` rescans from
//! disk; the dispatcher calls it once when a lookup misses.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use flow_context::{ExecutableLookup, LookupError};
use flow_types::flowfile::is_flowfile;
use flow_types::{Executable, ExecutableRef, FlowFile, UserConfig};
use tracing::{debug, warn};

pub struct CacheLookup {
  config: UserConfig,
  entries: RwLock<HashMap<String, Arc<Executable>>>,
}

impl CacheLookup {
  pub fn new(config: UserConfig) -> Result<Arc<Self>, LookupError> {
    let lookup = Arc::new(Self {
      config,
      entries: RwLock::new(HashMap::new()),
    });
    lookup.refresh()?;
    Ok(lookup)
  }

  fn scan(&self) -> Result<HashMap<String, Arc<Executable>>, LookupError> {
    let mut entries: HashMap<String, Arc<Executable>> = HashMap::new();

    for (workspace, workspace_path) in &self.config.workspaces {
      let mut flowfiles = Vec::new();
      collect_flowfiles(workspace_path, &mut flowfiles);

      for path in flowfiles {
        let flowfile = match FlowFile::load(&path, workspace, workspace_path) {
          Ok(flowfile) => flowfile,
          Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable flowfile");
            continue;
          }
        };

        for executable in flowfile.executables {
          if let Err(e) = executable.validate() {
            warn!(
              executable = %executable.reference(),
              error = %e,
              "skipping invalid executable"
            );
            continue;
          }

          let executable = Arc::new(executable);
          let canonical = executable.reference();
          let mut refs = vec![canonical.clone()];
          for alias in &executable.aliases.0 {
            let mut aliased = canonical.clone();
            aliased.name = alias.clone();
            refs.push(aliased);
          }

          for reference in refs {
            let key = reference.to_string();
            if entries.contains_key(&key) {
              warn!(reference = %key, "duplicate executable reference, keeping first");
              continue;
            }
            entries.insert(key, executable.clone());
          }
        }
      }
    }

    debug!(count = entries.len(), "indexed executables");
    Ok(entries)
  }
}

impl ExecutableLookup for CacheLookup {
  fn get(&self, reference: &ExecutableRef) -> Result<Arc<Executable>, LookupError> {
    self
      .entries
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(&reference.to_string())
      .cloned()
      .ok_or_else(|| LookupError::ExecutableNotFound {
        reference: reference.to_string(),
      })
  }

  fn refresh(&self) -> Result<(), LookupError> {
    let entries = self.scan()?;
    *self.entries.write().unwrap_or_else(|e| e.into_inner()) = entries;
    Ok(())
  }
}

fn collect_flowfiles(dir: &Path, flowfiles: &mut Vec<std::path::PathBuf>) {
  let Ok(read_dir) = std::fs::read_dir(dir) else {
    return;
  };
  for entry in read_dir.flatten() {
    let path = entry.path();
    let name = entry.file_name();
    let name = name.to_string_lossy();
    if name.starts_with('.') {
      continue;
    }
    if path.is_dir() {
      collect_flowfiles(&path, flowfiles);
    } else if is_flowfile(&path) {
      flowfiles.push(path);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn config_for(ws_path: PathBuf) -> UserConfig {
    UserConfig {
      current_workspace: "ws".to_string(),
      workspaces: HashMap::from([("ws".to_string(), ws_path)]),
      ..Default::default()
    }
  }

  #[test]
  fn scans_and_resolves_by_ref() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    std::fs::write(
      dir.path().join("sub/build.flow"),
      "namespace: ci\nexecutables:\n  - verb: build\n    name: site\n    aliases: [docs]\n    exec:\n      cmd: echo build\n",
    )
    .unwrap();

    let lookup = CacheLookup::new(config_for(dir.path().to_path_buf())).unwrap();

    let reference: ExecutableRef = "build ws/ci:site".parse().unwrap();
    let found = lookup.get(&reference).unwrap();
    assert_eq!(found.name, "site");

    let alias: ExecutableRef = "build ws/ci:docs".parse().unwrap();
    assert!(lookup.get(&alias).is_ok());

    let missing: ExecutableRef = "build ws/ci:other".parse().unwrap();
    assert!(matches!(
      lookup.get(&missing),
      Err(LookupError::ExecutableNotFound { .. })
    ));
  }

  #[test]
  fn refresh_picks_up_new_files() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = CacheLookup::new(config_for(dir.path().to_path_buf())).unwrap();

    let reference: ExecutableRef = "exec ws/:late".parse().unwrap();
    assert!(lookup.get(&reference).is_err());

    std::fs::write(
      dir.path().join("flowfile.yaml"),
      "executables:\n  - verb: exec\n    name: late\n    exec:\n      cmd: echo hi\n",
    )
    .unwrap();
    lookup.refresh().unwrap();
    assert!(lookup.get(&reference).is_ok());
  }
}
