//! Executable verbs.
//!
//! A verb is the action half of an invocable reference. Verbs form a closed
//! set; some carry aliases (`run` is equivalent to `exec`). Aliases normalize
//! to the canonical verb at parse time so that `(verb, id)` uniqueness checks
//! and lookups compare canonically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Verb {
  Exec,
  Build,
  Start,
  Install,
  Test,
  Publish,
  Deploy,
  Launch,
  Show,
  Clean,
}

impl Verb {
  /// Canonical string form of the verb.
  pub fn as_str(&self) -> &'static str {
    match self {
      Verb::Exec => "exec",
      Verb::Build => "build",
      Verb::Start => "start",
      Verb::Install => "install",
      Verb::Test => "test",
      Verb::Publish => "publish",
      Verb::Deploy => "deploy",
      Verb::Launch => "launch",
      Verb::Show => "show",
      Verb::Clean => "clean",
    }
  }

  /// Accepted aliases for this verb (canonical name excluded).
  pub fn aliases(&self) -> &'static [&'static str] {
    match self {
      Verb::Exec => &["run"],
      Verb::Launch => &["open"],
      Verb::Show => &["view"],
      _ => &[],
    }
  }

  /// All verb strings accepted on the command line, sorted.
  pub fn sorted_valid_verbs() -> Vec<&'static str> {
    let mut verbs: Vec<&'static str> = ALL
      .iter()
      .flat_map(|v| std::iter::once(v.as_str()).chain(v.aliases().iter().copied()))
      .collect();
    verbs.sort_unstable();
    verbs
  }

  /// Whether `other` refers to the same verb, accepting aliases.
  pub fn equals(&self, other: &str) -> bool {
    Verb::from_str(other).map(|v| v == *self).unwrap_or(false)
  }
}

const ALL: &[Verb] = &[
  Verb::Exec,
  Verb::Build,
  Verb::Start,
  Verb::Install,
  Verb::Test,
  Verb::Publish,
  Verb::Deploy,
  Verb::Launch,
  Verb::Show,
  Verb::Clean,
];

impl FromStr for Verb {
  type Err = TypeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    for verb in ALL {
      if verb.as_str() == s || verb.aliases().contains(&s) {
        return Ok(*verb);
      }
    }
    Err(TypeError::InvalidVerb {
      verb: s.to_string(),
    })
  }
}

impl fmt::Display for Verb {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl TryFrom<String> for Verb {
  type Error = TypeError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Verb::from_str(&value)
  }
}

impl From<Verb> for String {
  fn from(verb: Verb) -> Self {
    verb.as_str().to_string()
  }
}

impl Default for Verb {
  fn default() -> Self {
    Verb::Exec
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn aliases_normalize() {
    assert_eq!("run".parse::<Verb>().unwrap(), Verb::Exec);
    assert_eq!("open".parse::<Verb>().unwrap(), Verb::Launch);
    assert_eq!("view".parse::<Verb>().unwrap(), Verb::Show);
  }

  #[test]
  fn unknown_verb_rejected() {
    assert!("destroy".parse::<Verb>().is_err());
  }

  #[test]
  fn equals_accepts_aliases() {
    assert!(Verb::Exec.equals("run"));
    assert!(Verb::Exec.equals("exec"));
    assert!(!Verb::Exec.equals("build"));
  }

  #[test]
  fn sorted_verbs_include_aliases() {
    let verbs = Verb::sorted_valid_verbs();
    assert!(verbs.contains(&"exec"));
    assert!(verbs.contains(&"run"));
    assert!(verbs.windows(2).all(|w| w[0] <= w[1]));
  }
}
