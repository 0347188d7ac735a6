//! Declarative working directories.
//!
//! A `Directory` is a string that expands to an absolute path at run time:
//!
//! - empty: the directory of the defining flowfile
//! - `//`: the workspace root, `//sub` or `/sub`: workspace-relative
//! - `$TMP`: a per-process temporary directory, allocated on first use and
//!   shared by every subsequent expansion in the same run
//! - anything else: `${VAR}` expansion against the env map, then resolved
//!   relative to the flowfile directory

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const TMP_TOKEN: &str = "$TMP";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directory(pub String);

impl Directory {
  pub fn new(dir: impl Into<String>) -> Self {
    Self(dir.into())
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Expand to an absolute path.
  ///
  /// Returns the path and, when it lies under the per-process temp
  /// directory, the temp root (freshly allocated when `process_tmp_dir`
  /// was `None`) for the caller to record.
  pub fn expand(
    &self,
    workspace_path: &Path,
    flowfile_path: &Path,
    process_tmp_dir: Option<&Path>,
    env: &HashMap<String, String>,
  ) -> Result<(PathBuf, Option<PathBuf>), TypeError> {
    let dir = self.0.trim();

    if dir.is_empty() {
      return Ok((flowfile_dir(flowfile_path), None));
    }

    if dir == TMP_TOKEN || dir.starts_with("$TMP/") {
      let tmp = match process_tmp_dir {
        Some(existing) => existing.to_path_buf(),
        None => tempfile::Builder::new()
          .prefix("flow-")
          .tempdir()
          .map_err(|e| TypeError::DirectoryExpansion {
            directory: self.0.clone(),
            message: format!("unable to allocate temp directory: {e}"),
          })?
          .into_path(),
      };
      let rest = dir.trim_start_matches(TMP_TOKEN).trim_start_matches('/');
      let path = if rest.is_empty() {
        tmp.clone()
      } else {
        tmp.join(rest)
      };
      return Ok((path, Some(tmp)));
    }

    let expanded = expand_vars(dir, |key| env.get(key).cloned());

    if expanded == "//" {
      return Ok((workspace_path.to_path_buf(), None));
    }
    if let Some(rest) = expanded.strip_prefix("//") {
      return Ok((workspace_path.join(rest), None));
    }
    if let Some(rest) = expanded.strip_prefix('/') {
      return Ok((workspace_path.join(rest), None));
    }

    Ok((flowfile_dir(flowfile_path).join(expanded), None))
  }
}

impl fmt::Display for Directory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for Directory {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

fn flowfile_dir(flowfile_path: &Path) -> PathBuf {
  flowfile_path
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand `$VAR` and `${VAR}` occurrences using the given resolver.
///
/// Unresolved variables expand to the empty string.
pub fn expand_vars(input: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
  let mut out = String::with_capacity(input.len());
  let mut chars = input.char_indices().peekable();

  while let Some((_, c)) = chars.next() {
    if c != '$' {
      out.push(c);
      continue;
    }
    match chars.peek() {
      Some((_, '{')) => {
        chars.next();
        let mut name = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          name.push(c);
        }
        if closed {
          out.push_str(&resolve(&name).unwrap_or_default());
        } else {
          out.push_str("${");
          out.push_str(&name);
        }
      }
      Some((_, c)) if c.is_ascii_alphanumeric() || *c == '_' => {
        let mut name = String::new();
        while let Some((_, c)) = chars.peek() {
          if c.is_ascii_alphanumeric() || *c == '_' {
            name.push(*c);
            chars.next();
          } else {
            break;
          }
        }
        out.push_str(&resolve(&name).unwrap_or_default());
      }
      _ => out.push('$'),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn empty_expands_to_flowfile_dir() {
    let d = Directory::default();
    let (path, tmp_root) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/sub/flowfile.yaml"),
        None,
        &HashMap::new(),
      )
      .unwrap();
    assert_eq!(path, PathBuf::from("/ws/sub"));
    assert!(tmp_root.is_none());
  }

  #[test]
  fn double_slash_expands_to_workspace() {
    let d = Directory::from("//");
    let (path, tmp_root) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/flowfile.yaml"),
        None,
        &HashMap::new(),
      )
      .unwrap();
    assert_eq!(path, PathBuf::from("/ws"));
    assert!(tmp_root.is_none());
  }

  #[test]
  fn workspace_relative_subdirectory() {
    let d = Directory::from("//build/out");
    let (path, _) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/flowfile.yaml"),
        None,
        &HashMap::new(),
      )
      .unwrap();
    assert_eq!(path, PathBuf::from("/ws/build/out"));

    let d = Directory::from("/build");
    let (path, _) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/flowfile.yaml"),
        None,
        &HashMap::new(),
      )
      .unwrap();
    assert_eq!(path, PathBuf::from("/ws/build"));
  }

  #[test]
  fn tmp_allocates_once_and_reuses() {
    let d = Directory::from("$TMP");
    let (first, tmp_root) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/flowfile.yaml"),
        None,
        &HashMap::new(),
      )
      .unwrap();
    assert_eq!(tmp_root.as_deref(), Some(first.as_path()));
    assert!(first.is_dir());

    let (second, tmp_root) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/flowfile.yaml"),
        Some(&first),
        &HashMap::new(),
      )
      .unwrap();
    assert!(tmp_root.is_some());
    assert_eq!(first, second);

    std::fs::remove_dir_all(&first).unwrap();
  }

  #[test]
  fn tmp_subpath_joins_but_reports_the_root() {
    let d = Directory::from("$TMP/out");
    let (path, tmp_root) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/flowfile.yaml"),
        Some(Path::new("/tmp/flow-x")),
        &HashMap::new(),
      )
      .unwrap();
    assert_eq!(path, PathBuf::from("/tmp/flow-x/out"));
    assert_eq!(tmp_root, Some(PathBuf::from("/tmp/flow-x")));
  }

  #[test]
  fn env_vars_expand_in_paths() {
    let d = Directory::from("$BUILD_DIR/bin");
    let (path, _) = d
      .expand(
        Path::new("/ws"),
        Path::new("/ws/flowfile.yaml"),
        None,
        &env(&[("BUILD_DIR", "target")]),
      )
      .unwrap();
    assert_eq!(path, PathBuf::from("/ws/target/bin"));
  }

  #[test]
  fn expand_vars_syntax() {
    let resolve = |k: &str| match k {
      "A" => Some("1".to_string()),
      "LONG_NAME" => Some("x".to_string()),
      _ => None,
    };
    assert_eq!(expand_vars("$A/${LONG_NAME}", resolve), "1/x");
    assert_eq!(expand_vars("$MISSING!", resolve), "!");
    assert_eq!(expand_vars("no vars", resolve), "no vars");
    assert_eq!(expand_vars("trailing $", resolve), "trailing $");
  }
}
