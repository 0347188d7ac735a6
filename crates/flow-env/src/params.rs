//! Parameter value resolution.

use std::collections::HashMap;

use flow_context::SecretLookup;
use flow_types::Parameter;

use crate::error::EnvError;

/// Resolve a parameter's value.
///
/// Values already present in the prompted env win; they may come in as a
/// param override from the CLI or from a parent executable.
pub fn resolve_parameter_value(
  secrets: &dyn SecretLookup,
  current_vault: &str,
  param: &Parameter,
  prompted_env: &HashMap<String, String>,
) -> Result<String, EnvError> {
  if !param.env_key.is_empty() {
    if let Some(val) = prompted_env.get(&param.env_key) {
      return Ok(val.clone());
    }
  }

  if !param.text.is_empty() {
    return Ok(param.text.clone());
  }
  if !param.prompt.is_empty() {
    return prompted_env
      .get(&param.env_key)
      .cloned()
      .ok_or_else(|| EnvError::Parameter {
        env_key: param.env_key.clone(),
        message: "no value collected for prompt".to_string(),
      });
  }
  if !param.secret_ref.is_empty() {
    return resolve_secret_value(secrets, current_vault, &param.secret_ref);
  }

  Ok(String::new())
}

/// Resolve a `[vault:]key` secret reference against the vault.
fn resolve_secret_value(
  secrets: &dyn SecretLookup,
  current_vault: &str,
  secret_ref: &str,
) -> Result<String, EnvError> {
  let (vault, key) = match secret_ref.split_once(':') {
    Some((vault, key)) if !vault.is_empty() => (vault, key),
    Some((_, key)) => (current_vault, key),
    None => (current_vault, secret_ref),
  };
  Ok(secrets.get_secret(vault, key)?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use flow_context::LookupError;

  struct FakeVault;

  impl SecretLookup for FakeVault {
    fn get_secret(&self, vault: &str, key: &str) -> Result<String, LookupError> {
      match (vault, key) {
        ("personal", "token") => Ok("s3cret".to_string()),
        ("work", "token") => Ok("work-token".to_string()),
        _ => Err(LookupError::SecretNotFound {
          vault: vault.to_string(),
          key: key.to_string(),
        }),
      }
    }
  }

  fn param(env_key: &str) -> Parameter {
    Parameter {
      env_key: env_key.to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn prompted_env_wins_over_text() {
    let mut p = param("VAR");
    p.text = "declared".to_string();
    let env = HashMap::from([("VAR".to_string(), "override".to_string())]);
    let val = resolve_parameter_value(&FakeVault, "personal", &p, &env).unwrap();
    assert_eq!(val, "override");
  }

  #[test]
  fn text_resolves_literally() {
    let mut p = param("VAR");
    p.text = "hello".to_string();
    let val = resolve_parameter_value(&FakeVault, "personal", &p, &HashMap::new()).unwrap();
    assert_eq!(val, "hello");
  }

  #[test]
  fn prompt_requires_collected_value() {
    let mut p = param("NAME");
    p.prompt = "What is your name?".to_string();
    assert!(resolve_parameter_value(&FakeVault, "personal", &p, &HashMap::new()).is_err());

    let env = HashMap::from([("NAME".to_string(), "sam".to_string())]);
    let val = resolve_parameter_value(&FakeVault, "personal", &p, &env).unwrap();
    assert_eq!(val, "sam");
  }

  #[test]
  fn secret_ref_defaults_to_current_vault() {
    let mut p = param("TOKEN");
    p.secret_ref = "token".to_string();
    let val = resolve_parameter_value(&FakeVault, "personal", &p, &HashMap::new()).unwrap();
    assert_eq!(val, "s3cret");
  }

  #[test]
  fn secret_ref_with_explicit_vault() {
    let mut p = param("TOKEN");
    p.secret_ref = "work:token".to_string();
    let val = resolve_parameter_value(&FakeVault, "personal", &p, &HashMap::new()).unwrap();
    assert_eq!(val, "work-token");
  }

  #[test]
  fn missing_secret_is_an_error() {
    let mut p = param("TOKEN");
    p.secret_ref = "missing".to_string();
    assert!(resolve_parameter_value(&FakeVault, "personal", &p, &HashMap::new()).is_err());
  }

  #[test]
  fn empty_sources_resolve_to_empty() {
    let p = param("VAR");
    let val = resolve_parameter_value(&FakeVault, "personal", &p, &HashMap::new()).unwrap();
    assert_eq!(val, "");
  }
}
