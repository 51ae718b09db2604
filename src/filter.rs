//! Visible-question derivation over the question map and the global filter.
//!
//! Recomputed from state on every read; nothing here is cached.

use indexmap::IndexMap;

use crate::domain::Question;

/// Questions passing both the skip and the tag predicate, in map insertion order.
pub fn visible_questions<'a>(
  questions: &'a IndexMap<String, Question>,
  show_skipped: bool,
  tag_filter: &str,
) -> Vec<&'a Question> {
  let needle = tag_filter.trim().to_lowercase();
  questions
    .values()
    .filter(|q| show_skipped || !q.fe_meta.skipped())
    .filter(|q| needle.is_empty() || matches_tag(q, &needle))
    .collect()
}

/// `needle` must already be trimmed and lower-cased.
fn matches_tag(q: &Question, needle: &str) -> bool {
  let flags = q.fe_meta.user_flags.as_deref().unwrap_or("");
  // Zero tokens (missing, empty or whitespace-only) never match an active filter.
  flags
    .split_whitespace()
    .map(|t| t.trim().to_lowercase())
    .any(|t| t.contains(needle))
}

/// Stable sort by `userSortPosition`; unpositioned questions keep their order at the end.
pub fn sort_by_position(questions: &mut [&Question]) {
  questions.sort_by_key(|q| match q.fe_meta.user_sort_position {
    Some(p) => (0, p),
    None => (1, 0),
  });
}
