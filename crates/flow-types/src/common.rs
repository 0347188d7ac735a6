//! Shared model helpers: visibility, aliases, tags, and log modes.

use serde::{Deserialize, Serialize};

/// Controls where an executable appears when listing and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
  Public,
  Private,
  Internal,
  Hidden,
}

impl Visibility {
  /// Hierarchical level used for filtering comparisons.
  ///
  /// Most to least visible: public=1, private=2, internal=3, hidden=4.
  pub fn level(&self) -> u8 {
    match self {
      Visibility::Public => 1,
      Visibility::Private => 2,
      Visibility::Internal => 3,
      Visibility::Hidden => 4,
    }
  }

  pub fn is_public(&self) -> bool {
    matches!(self, Visibility::Public)
  }

  pub fn is_hidden(&self) -> bool {
    matches!(self, Visibility::Hidden)
  }
}

impl Default for Visibility {
  fn default() -> Self {
    Visibility::Private
  }
}

/// Alternate names an executable answers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aliases(pub Vec<String>);

impl Aliases {
  /// An empty alias filter matches everything.
  pub fn has_alias(&self, alias: &str) -> bool {
    alias.is_empty() || self.0.iter().any(|a| a == alias)
  }
}

/// Free-form labels used for filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(pub Vec<String>);

impl Tags {
  pub fn has_tag(&self, tag: &str) -> bool {
    tag.is_empty() || self.0.iter().any(|t| t == tag)
  }

  pub fn has_any_tag(&self, tags: &Tags) -> bool {
    if tags.0.is_empty() {
      return true;
    }
    tags.0.iter().any(|t| self.has_tag(t))
  }
}

/// How command output lines are forwarded to the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
  Text,
  Json,
  Logfmt,
}

impl LogMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      LogMode::Text => "text",
      LogMode::Json => "json",
      LogMode::Logfmt => "logfmt",
    }
  }

  pub fn parse(s: &str) -> Option<LogMode> {
    match s {
      "text" => Some(LogMode::Text),
      "json" => Some(LogMode::Json),
      "logfmt" => Some(LogMode::Logfmt),
      _ => None,
    }
  }
}

impl Default for LogMode {
  fn default() -> Self {
    LogMode::Text
  }
}
