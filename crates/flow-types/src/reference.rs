//! Executable references.
//!
//! An executable is identified by the triple `(workspace, namespace, name)`,
//! written `workspace/namespace:name` with empty parts omitted. A reference
//! pairs a verb with an ID: `"<verb> <id>"`. The `*` wildcard stands for
//! "any workspace" / "any namespace" and expands to the current scope at
//! resolution time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::verb::Verb;

pub const WILDCARD: &str = "*";

/// A fully spelled-out reference to an executable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExecutableRef {
  pub verb: Verb,
  pub workspace: String,
  pub namespace: String,
  pub name: String,
}

impl ExecutableRef {
  pub fn new(verb: Verb, workspace: &str, namespace: &str, name: &str) -> Self {
    Self {
      verb,
      workspace: workspace.to_string(),
      namespace: namespace.to_string(),
      name: name.to_string(),
    }
  }

  /// Parse the ID half of a reference (`[workspace/][namespace:]name`).
  pub fn parse_id(verb: Verb, id: &str) -> Self {
    let (workspace, rest) = match id.split_once('/') {
      Some((ws, rest)) => (ws.to_string(), rest),
      None => (String::new(), id),
    };
    let (namespace, name) = match rest.split_once(':') {
      Some((ns, name)) => (ns.to_string(), name.to_string()),
      None => (String::new(), rest.to_string()),
    };
    Self {
      verb,
      workspace,
      namespace,
      name,
    }
  }

  /// The ID string with empty parts omitted.
  pub fn id(&self) -> String {
    let mut id = String::new();
    if !self.workspace.is_empty() {
      id.push_str(&self.workspace);
      id.push('/');
    }
    if !self.namespace.is_empty() {
      id.push_str(&self.namespace);
      id.push(':');
    }
    id.push_str(&self.name);
    id
  }

  /// Replace empty or wildcard workspace/namespace with the given scope.
  pub fn expanded(&self, workspace: &str, namespace: &str) -> Self {
    let mut expanded = self.clone();
    if expanded.workspace.is_empty() || expanded.workspace == WILDCARD {
      expanded.workspace = workspace.to_string();
    }
    if expanded.namespace.is_empty() || expanded.namespace == WILDCARD {
      expanded.namespace = namespace.to_string();
    }
    expanded
  }
}

impl fmt::Display for ExecutableRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.verb, self.id())
  }
}

impl FromStr for ExecutableRef {
  type Err = TypeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (verb, id) = s.split_once(' ').ok_or_else(|| TypeError::InvalidRef {
      reference: s.to_string(),
    })?;
    let verb = verb.parse::<Verb>().map_err(|_| TypeError::InvalidRef {
      reference: s.to_string(),
    })?;
    if id.trim().is_empty() || id.contains(' ') {
      return Err(TypeError::InvalidRef {
        reference: s.to_string(),
      });
    }
    Ok(Self::parse_id(verb, id.trim()))
  }
}

impl TryFrom<String> for ExecutableRef {
  type Error = TypeError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ExecutableRef> for String {
  fn from(r: ExecutableRef) -> Self {
    r.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_full_id() {
    let r: ExecutableRef = "exec ws/ns:build".parse().unwrap();
    assert_eq!(r.verb, Verb::Exec);
    assert_eq!(r.workspace, "ws");
    assert_eq!(r.namespace, "ns");
    assert_eq!(r.name, "build");
  }

  #[test]
  fn parse_partial_ids() {
    let r: ExecutableRef = "build app".parse().unwrap();
    assert_eq!(r.workspace, "");
    assert_eq!(r.namespace, "");
    assert_eq!(r.name, "app");

    let r: ExecutableRef = "build ns:app".parse().unwrap();
    assert_eq!(r.namespace, "ns");
    assert_eq!(r.name, "app");

    let r: ExecutableRef = "build ws/app".parse().unwrap();
    assert_eq!(r.workspace, "ws");
    assert_eq!(r.name, "app");
  }

  #[test]
  fn canonical_round_trip() {
    for s in [
      "exec ws/ns:build",
      "build app",
      "show ns:docs",
      "launch ws/site",
      "exec */ns:thing",
    ] {
      let parsed: ExecutableRef = s.parse().unwrap();
      assert_eq!(parsed.to_string(), s);
    }
  }

  #[test]
  fn alias_verbs_canonicalize() {
    let r: ExecutableRef = "run ws/ns:build".parse().unwrap();
    assert_eq!(r.to_string(), "exec ws/ns:build");
  }

  #[test]
  fn expansion_fills_wildcards() {
    let r: ExecutableRef = "exec */thing".parse().unwrap();
    let expanded = r.expanded("home", "dev");
    assert_eq!(expanded.workspace, "home");
    assert_eq!(expanded.namespace, "dev");
    assert_eq!(expanded.name, "thing");

    let r: ExecutableRef = "exec ws/*:thing".parse().unwrap();
    let expanded = r.expanded("home", "dev");
    assert_eq!(expanded.workspace, "ws");
    assert_eq!(expanded.namespace, "dev");
  }

  #[test]
  fn invalid_refs_rejected() {
    assert!("exec".parse::<ExecutableRef>().is_err());
    assert!("frobnicate ws/ns:x".parse::<ExecutableRef>().is_err());
    assert!("exec  ".parse::<ExecutableRef>().is_err());
  }
}
