//! Questionnaire store: the question map with client metadata, draft responses,
//! in-flight submissions and filter criteria.
//!
//! All mutation goes through `Store::dispatch`. Every action is total: unknown
//! question ids are silent no-ops, nothing here can fail.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::domain::{
  AcceptedResponse, DraftValue, FeMeta, FilterCriteria, Question, Questionnaire, SubmitAnswerAck,
};
use crate::filter::visible_questions;
use crate::util::to_epoch_millis;

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
  QuestionnaireLoaded(Questionnaire),
  Reset,
  SetDraftText { question_id: String, text: String },
  SetDraftOptions { question_id: String, options: Vec<String> },
  ClearDraft { question_id: String },
  CommitDraft { question_id: String },
  SubmissionPending { question_id: String },
  SubmissionAccepted(SubmitAnswerAck),
  SubmissionRejected { question_id: String },
  UpdateFeMeta { question_id: String, meta: FeMeta },
  SetShowSkipped(bool),
  SetTagFilter(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Store {
  questionnaire_id: Option<String>,
  exam_meta: Option<serde_json::Value>,
  questions: IndexMap<String, Question>,
  drafts: HashMap<String, DraftValue>,
  in_flight: HashSet<String>,
  filter: FilterCriteria,
}

impl Store {
  pub fn new() -> Self { Self::default() }

  /// Apply one action. Returns whether anything changed.
  #[instrument(level = "debug", skip_all)]
  pub fn dispatch(&mut self, action: Action) -> bool {
    match action {
      Action::QuestionnaireLoaded(q) => {
        debug!(target: "store", questionnaire_id = %q.questionnaire_id, questions = q.questions.len(), "questionnaire loaded");
        self.questionnaire_id = Some(q.questionnaire_id);
        self.exam_meta = q.exam_meta_data;
        self.questions = q.questions.into_iter().map(|q| (q.question_id.clone(), q)).collect();
        self.drafts.clear();
        self.in_flight.clear();
        true
      }
      Action::Reset => {
        let filter = std::mem::take(&mut self.filter);
        *self = Self { filter, ..Self::default() };
        true
      }
      Action::SetDraftText { question_id, text } => {
        self.drafts.insert(question_id, DraftValue::Text { text });
        true
      }
      Action::SetDraftOptions { question_id, options } => {
        // A text draft is dropped: a draft holds text or options, never both.
        match self.drafts.get_mut(&question_id) {
          Some(DraftValue::Options { selected_options }) => *selected_options = options,
          _ => {
            self.drafts.insert(question_id, DraftValue::Options { selected_options: options });
          }
        }
        true
      }
      Action::ClearDraft { question_id } | Action::CommitDraft { question_id } => {
        self.drafts.remove(&question_id).is_some()
      }
      Action::SubmissionPending { question_id } => self.in_flight.insert(question_id),
      Action::SubmissionAccepted(ack) => {
        self.append_history(&ack);
        self.drafts.remove(&ack.question_id);
        self.in_flight.remove(&ack.question_id);
        true
      }
      Action::SubmissionRejected { question_id } => self.in_flight.remove(&question_id),
      Action::UpdateFeMeta { question_id, meta } => match self.questions.get_mut(&question_id) {
        Some(q) if q.fe_meta != meta => {
          q.fe_meta = meta;
          true
        }
        _ => false,
      },
      Action::SetShowSkipped(show) => {
        let changed = self.filter.show_skipped != show;
        self.filter.show_skipped = show;
        changed
      }
      Action::SetTagFilter(tag) => {
        let changed = self.filter.tag_filter != tag;
        self.filter.tag_filter = tag;
        changed
      }
    }
  }

  fn append_history(&mut self, ack: &SubmitAnswerAck) {
    let Some(q) = self.questions.get_mut(&ack.question_id) else {
      debug!(target: "store", question_id = %ack.question_id, "accepted response for unknown question; history not updated");
      return;
    };
    let system_accept_time = to_epoch_millis(&ack.system_accept_time_utc).unwrap_or_else(|| {
      warn!(target: "store", value = %ack.system_accept_time_utc, "unparseable accept time; using local clock");
      chrono::Utc::now().timestamp_millis()
    });
    q.user_response_history.push(AcceptedResponse {
      question_id: ack.question_id.clone(),
      user_response: ack.user_response.clone(),
      system_user_response_id: ack.system_user_response_id.clone(),
      system_accept_time,
    });
  }

  pub fn questionnaire_id(&self) -> Option<&str> { self.questionnaire_id.as_deref() }

  pub fn exam_meta(&self) -> Option<&serde_json::Value> { self.exam_meta.as_ref() }

  pub fn questions(&self) -> &IndexMap<String, Question> { &self.questions }

  pub fn question(&self, question_id: &str) -> Option<&Question> { self.questions.get(question_id) }

  pub fn drafts(&self) -> &HashMap<String, DraftValue> { &self.drafts }

  pub fn draft(&self, question_id: &str) -> Option<&DraftValue> { self.drafts.get(question_id) }

  /// True while any submission is in flight. Response controls disable submit on this.
  pub fn is_editing(&self) -> bool { !self.in_flight.is_empty() }

  pub fn is_in_flight(&self, question_id: &str) -> bool { self.in_flight.contains(question_id) }

  pub fn filter(&self) -> &FilterCriteria { &self.filter }

  pub fn visible_questions(&self) -> Vec<&Question> {
    visible_questions(&self.questions, self.filter.show_skipped, &self.filter.tag_filter)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn question(id: &str) -> Question {
    Question {
      question_id: id.into(),
      prompt_type: "text".into(),
      prompt: format!("prompt {id}"),
      media_url: None,
      response_type: "freeText".into(),
      options: vec![],
      fe_meta: FeMeta::default(),
      user_response_history: vec![],
    }
  }

  fn loaded(ids: &[&str]) -> Store {
    let mut s = Store::new();
    s.dispatch(Action::QuestionnaireLoaded(Questionnaire {
      questionnaire_id: "qn".into(),
      questions: ids.iter().map(|id| question(id)).collect(),
      exam_meta_data: None,
    }));
    s
  }

  fn ack(id: &str, value: DraftValue, rid: &str) -> SubmitAnswerAck {
    SubmitAnswerAck {
      question_id: id.into(),
      user_response: value,
      system_user_response_id: rid.into(),
      system_accept_time_utc: "2024-03-01T12:00:00Z".into(),
    }
  }

  #[test]
  fn set_text_replaces_entry() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::SetDraftOptions { question_id: "q1".into(), options: vec!["a".into()] });
    s.dispatch(Action::SetDraftText { question_id: "q1".into(), text: "hello".into() });
    assert_eq!(s.draft("q1"), Some(&DraftValue::text("hello")));
  }

  #[test]
  fn set_options_creates_then_overwrites() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::SetDraftOptions { question_id: "q1".into(), options: vec!["a".into()] });
    s.dispatch(Action::SetDraftOptions { question_id: "q1".into(), options: vec!["b".into(), "c".into()] });
    assert_eq!(s.draft("q1"), Some(&DraftValue::options(vec!["b".into(), "c".into()])));
  }

  #[test]
  fn set_options_discards_text_draft() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::SetDraftText { question_id: "q1".into(), text: "hello".into() });
    s.dispatch(Action::SetDraftOptions { question_id: "q1".into(), options: vec!["a".into()] });
    assert_eq!(s.draft("q1"), Some(&DraftValue::options(vec!["a".into()])));
  }

  #[test]
  fn clear_and_commit_remove_draft_and_tolerate_absence() {
    let mut s = loaded(&["q1"]);
    let edits = [
      Action::SetDraftText { question_id: "q1".into(), text: "x".into() },
      Action::SetDraftOptions { question_id: "q1".into(), options: vec!["a".into()] },
      Action::SetDraftText { question_id: "q1".into(), text: "y".into() },
    ];
    for end in [Action::ClearDraft { question_id: "q1".into() }, Action::CommitDraft { question_id: "q1".into() }] {
      for e in edits.iter().cloned() {
        s.dispatch(e);
      }
      assert!(s.dispatch(end.clone()));
      assert!(s.draft("q1").is_none());
      assert!(!s.dispatch(end));
    }
  }

  #[test]
  fn accepted_submission_appends_history_and_clears_state() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::SetDraftText { question_id: "q1".into(), text: "A".into() });
    s.dispatch(Action::SubmissionPending { question_id: "q1".into() });
    assert!(s.is_editing());

    s.dispatch(Action::SubmissionAccepted(ack("q1", DraftValue::text("A"), "r1")));

    assert!(!s.is_editing());
    assert!(s.draft("q1").is_none());
    let history = &s.question("q1").unwrap().user_response_history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question_id, "q1");
    assert_eq!(history[0].user_response, DraftValue::text("A"));
    assert_eq!(history[0].system_user_response_id, "r1");
    assert_eq!(history[0].system_accept_time, 1_709_294_400_000);
  }

  #[test]
  fn history_is_append_only_in_submission_order() {
    let mut s = loaded(&["q1"]);
    let mut late = ack("q1", DraftValue::text("first"), "r1");
    late.system_accept_time_utc = "2030-01-01T00:00:00Z".into();
    s.dispatch(Action::SubmissionAccepted(late));
    s.dispatch(Action::SubmissionAccepted(ack("q1", DraftValue::text("second"), "r2")));

    let q = s.question("q1").unwrap();
    assert_eq!(q.current_response().unwrap().system_user_response_id, "r2");
    assert_eq!(q.previous_responses().len(), 1);
    assert_eq!(q.previous_responses()[0].system_user_response_id, "r1");
  }

  #[test]
  fn accepted_submission_for_unknown_question_skips_history() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::SetDraftText { question_id: "ghost".into(), text: "A".into() });
    s.dispatch(Action::SubmissionPending { question_id: "ghost".into() });
    s.dispatch(Action::SubmissionAccepted(ack("ghost", DraftValue::text("A"), "r1")));
    assert!(s.question("ghost").is_none());
    assert!(s.draft("ghost").is_none());
    assert!(!s.is_editing());
    assert!(s.question("q1").unwrap().user_response_history.is_empty());
  }

  #[test]
  fn rejected_submission_keeps_draft() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::SetDraftText { question_id: "q1".into(), text: "A".into() });
    s.dispatch(Action::SubmissionPending { question_id: "q1".into() });
    s.dispatch(Action::SubmissionRejected { question_id: "q1".into() });
    assert!(!s.is_editing());
    assert_eq!(s.draft("q1"), Some(&DraftValue::text("A")));
  }

  #[test]
  fn concurrent_submissions_keep_editing_until_all_settle() {
    let mut s = loaded(&["q1", "q2"]);
    s.dispatch(Action::SubmissionPending { question_id: "q1".into() });
    s.dispatch(Action::SubmissionPending { question_id: "q2".into() });
    s.dispatch(Action::SubmissionAccepted(ack("q1", DraftValue::text("A"), "r1")));
    assert!(s.is_editing());
    assert!(!s.is_in_flight("q1"));
    assert!(s.is_in_flight("q2"));
    s.dispatch(Action::SubmissionRejected { question_id: "q2".into() });
    assert!(!s.is_editing());
  }

  #[test]
  fn fe_meta_update_replaces_whole_object() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::UpdateFeMeta {
      question_id: "q1".into(),
      meta: FeMeta { is_skipped: Some(true), user_flags: Some("x".into()), user_sort_position: Some(3) },
    });
    s.dispatch(Action::UpdateFeMeta {
      question_id: "q1".into(),
      meta: FeMeta { user_flags: Some("y".into()), ..FeMeta::default() },
    });
    let meta = &s.question("q1").unwrap().fe_meta;
    assert_eq!(meta.is_skipped, None);
    assert_eq!(meta.user_flags.as_deref(), Some("y"));
    assert_eq!(meta.user_sort_position, None);
  }

  #[test]
  fn fe_meta_update_for_absent_question_leaves_state_unchanged() {
    let mut s = loaded(&["q1", "q2"]);
    s.dispatch(Action::SetDraftText { question_id: "q1".into(), text: "A".into() });
    let before = s.clone();
    let changed = s.dispatch(Action::UpdateFeMeta {
      question_id: "missing".into(),
      meta: FeMeta { is_skipped: Some(true), ..FeMeta::default() },
    });
    assert!(!changed);
    assert_eq!(s, before);
  }

  #[test]
  fn loading_discards_previous_drafts_and_metadata() {
    let mut s = loaded(&["q1"]);
    s.dispatch(Action::SetDraftText { question_id: "q1".into(), text: "A".into() });
    s.dispatch(Action::UpdateFeMeta { question_id: "q1".into(), meta: FeMeta { is_skipped: Some(true), ..FeMeta::default() } });
    s.dispatch(Action::SetTagFilter("keep".into()));
    let s2 = {
      let mut s2 = s.clone();
      s2.dispatch(Action::QuestionnaireLoaded(Questionnaire {
        questionnaire_id: "qn2".into(),
        questions: vec![question("q1")],
        exam_meta_data: None,
      }));
      s2
    };
    assert!(s2.drafts().is_empty());
    assert!(!s2.question("q1").unwrap().fe_meta.skipped());
    assert_eq!(s2.questionnaire_id(), Some("qn2"));
    assert_eq!(s2.filter().tag_filter, "keep");

    s.dispatch(Action::Reset);
    assert!(s.questions().is_empty());
    assert_eq!(s.filter().tag_filter, "keep");
  }

  #[test]
  fn visible_questions_follow_filter_actions() {
    let mut s = loaded(&["q1", "q2"]);
    s.dispatch(Action::UpdateFeMeta { question_id: "q2".into(), meta: FeMeta { is_skipped: Some(true), ..FeMeta::default() } });
    assert_eq!(s.visible_questions().len(), 1);
    assert!(s.dispatch(Action::SetShowSkipped(true)));
    assert_eq!(s.visible_questions().len(), 2);
    assert!(!s.dispatch(Action::SetShowSkipped(true)));
    s.dispatch(Action::SetTagFilter("nothing".into()));
    assert!(s.visible_questions().is_empty());
  }
}
