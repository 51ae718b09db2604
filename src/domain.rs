//! Domain models: questions, drafts, accepted responses, filter criteria and the
//! admin resource kinds managed through the resource cache.

use serde::{Deserialize, Serialize};

/// Client-only per-question metadata. Never sent upstream in the answering flow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeMeta {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_skipped: Option<bool>,
  /// Free-text, whitespace-separated user tags.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_flags: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_sort_position: Option<i64>,
}

impl FeMeta {
  pub fn skipped(&self) -> bool { self.is_skipped == Some(true) }
}

/// One selectable option of a choice question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOption {
  pub option_id: String,
  pub text: String,
}

/// In-progress or submitted answer value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DraftValue {
  Text {
    text: String,
  },
  Options {
    #[serde(rename = "selectedOptions")]
    selected_options: Vec<String>,
  },
}

#[cfg(test)]
impl DraftValue {
  pub fn text(text: impl Into<String>) -> Self { DraftValue::Text { text: text.into() } }

  pub fn options(options: Vec<String>) -> Self { DraftValue::Options { selected_options: options } }
}

/// Server-acknowledged answer. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
  pub question_id: String,
  pub user_response: DraftValue,
  pub system_user_response_id: String,
  /// Epoch milliseconds.
  pub system_accept_time: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub question_id: String,
  /// `text` or `multimedia`; kept raw so unknown kinds reach the control layer.
  pub prompt_type: String,
  #[serde(default)]
  pub prompt: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub media_url: Option<String>,
  /// `singleChoice2`, `singleChoice4`, `multiSelect` or `freeText`.
  pub response_type: String,
  #[serde(default)]
  pub options: Vec<ResponseOption>,
  #[serde(default)]
  pub fe_meta: FeMeta,
  #[serde(default)]
  pub user_response_history: Vec<AcceptedResponse>,
}

impl Question {
  /// The last accepted response, by submission order.
  pub fn current_response(&self) -> Option<&AcceptedResponse> { self.user_response_history.last() }

  pub fn previous_responses(&self) -> &[AcceptedResponse] {
    let n = self.user_response_history.len();
    &self.user_response_history[..n.saturating_sub(1)]
  }
}

/// Payload of "fetch questionnaire".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
  pub questionnaire_id: String,
  #[serde(default)]
  pub questions: Vec<Question>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exam_meta_data: Option<serde_json::Value>,
}

/// Body of "submit answer".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswer {
  pub question_id: String,
  pub user_response_type: String,
  pub user_response: DraftValue,
}

/// Upstream acknowledgment of an accepted submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerAck {
  pub question_id: String,
  pub user_response: DraftValue,
  pub system_user_response_id: String,
  /// RFC 3339 timestamp.
  pub system_accept_time_utc: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
  #[serde(default)]
  pub show_skipped: bool,
  #[serde(default)]
  pub tag_filter: String,
}

/// Admin resources served through the resource cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  Institution,
  Course,
  ExamTemplate,
  QuestionTemplate,
  FodderPool,
  User,
  Questionnaire,
}

impl ResourceKind {
  pub const ADMIN: [ResourceKind; 6] = [
    ResourceKind::Institution,
    ResourceKind::Course,
    ResourceKind::ExamTemplate,
    ResourceKind::QuestionTemplate,
    ResourceKind::FodderPool,
    ResourceKind::User,
  ];

  /// Upstream collection path segment.
  pub fn path(self) -> &'static str {
    match self {
      ResourceKind::Institution => "institutions",
      ResourceKind::Course => "courses",
      ResourceKind::ExamTemplate => "exam-templates",
      ResourceKind::QuestionTemplate => "question-templates",
      ResourceKind::FodderPool => "fodder-pools",
      ResourceKind::User => "users",
      ResourceKind::Questionnaire => "questionnaires",
    }
  }

  /// Parse an admin path segment. `questionnaires` is not an admin resource.
  pub fn from_admin_path(segment: &str) -> Option<Self> {
    Self::ADMIN.into_iter().find(|k| k.path() == segment)
  }
}
