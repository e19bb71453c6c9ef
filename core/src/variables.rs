//! C4 — Variable Resolver.
//!
//! Expands `${VAR}` / `${VAR:-default}` placeholders against a supplied
//! map and flags unresolved references after a single pass (§4.4).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn placeholder_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap()
  })
}

/// Substitutes `${NAME}` and `${NAME:-DEFAULT}` against `vars`.
///
/// Returns the substituted text. If unresolved `${` sequences remain after
/// the pass, `unresolved` is populated and the caller decides the policy
/// (resolver itself never throws).
pub fn resolve(template: &str, vars: &BTreeMap<String, String>) -> ResolveOutcome {
  let result = placeholder_re()
    .replace_all(template, |caps: &regex::Captures| {
      let name = &caps[1];
      match vars.get(name) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string(),
      }
    })
    .into_owned();

  let unresolved = result.contains("${");
  ResolveOutcome { text: result, unresolved }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
  pub text: String,
  pub unresolved: bool,
}

/// Resolver used for connection strings: returns `None` (never throws) if
/// any reference is left unresolved after the pass (§4.4, §4.9 step 2).
pub fn resolve_connection_string(
  template: &str,
  vars: &BTreeMap<String, String>,
) -> Option<String> {
  let outcome = resolve(template, vars);
  if outcome.unresolved {
    None
  } else {
    Some(outcome.text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn substitutes_present_value() {
    let v = vars(&[("HOST", "db.internal")]);
    let out = resolve("postgres://${HOST}/app", &v);
    assert_eq!(out.text, "postgres://db.internal/app");
    assert!(!out.unresolved);
  }

  #[test]
  fn falls_back_to_default_when_missing() {
    let v = vars(&[]);
    let out = resolve("${PORT:-5432}", &v);
    assert_eq!(out.text, "5432");
  }

  #[test]
  fn empty_value_still_falls_back_to_default() {
    let v = vars(&[("PORT", "")]);
    let out = resolve("${PORT:-5432}", &v);
    assert_eq!(out.text, "5432");
  }

  #[test]
  fn missing_without_default_substitutes_empty() {
    let v = vars(&[]);
    let out = resolve("${MISSING}", &v);
    assert_eq!(out.text, "");
    assert!(!out.unresolved);
  }

  #[test]
  fn reports_unresolved_when_braces_remain() {
    // A nested `${` inside a default value is the canonical way a
    // placeholder survives a single pass unresolved.
    let v = vars(&[]);
    let out = resolve("${A:-${B}}", &v);
    assert!(out.unresolved);
  }

  #[test]
  fn connection_string_resolver_never_throws() {
    let v = vars(&[]);
    assert_eq!(
      resolve_connection_string("${A:-${B}}", &v),
      None
    );
    assert_eq!(
      resolve_connection_string("${A:-ok}", &v),
      Some("ok".to_string())
    );
  }

  #[test]
  fn idempotent_when_fully_defined() {
    let v = vars(&[("A", "x"), ("B", "y")]);
    let template = "${A}-${B:-z}";
    let first = resolve(template, &v).text;
    let second = resolve(&first, &v).text;
    assert_eq!(first, second);
  }
}
