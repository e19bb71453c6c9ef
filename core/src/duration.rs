//! Duration strings of the form `<int>[s|m|h]` (§3, Design Notes).
//!
//! Anything else — empty, missing suffix, unknown suffix — parses to
//! `None` and the caller falls back to its documented default.

use std::time::Duration;

pub fn parse_duration(s: &str) -> Option<Duration> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }
  let (digits, unit) = s.split_at(s.len() - 1);
  let scale = match unit {
    "s" => 1,
    "m" => 60,
    "h" => 3600,
    _ => return None,
  };
  let value: u64 = digits.parse().ok()?;
  Some(Duration::from_secs(value * scale))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_seconds_minutes_hours() {
    assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
    assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
    assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
  }

  #[test]
  fn rejects_unknown_forms() {
    assert_eq!(parse_duration(""), None);
    assert_eq!(parse_duration("30"), None);
    assert_eq!(parse_duration("30d"), None);
    assert_eq!(parse_duration("abc"), None);
  }
}
