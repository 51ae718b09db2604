//! Small utility helpers used across modules.

use chrono::DateTime;

/// RFC 3339 timestamp to epoch milliseconds. `None` if it does not parse.
pub fn to_epoch_millis(ts: &str) -> Option<i64> {
  DateTime::parse_from_rfc3339(ts.trim()).ok().map(|dt| dt.timestamp_millis())
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge upstream error bodies.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
