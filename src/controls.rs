//! Prompt and response control selection for a question.
//!
//! Closed variant sets with an explicit unsupported arm. Callers render the
//! error inline instead of failing the surrounding view.

use serde::Serialize;
use thiserror::Error;

use crate::domain::{DraftValue, Question};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResponseControl {
  /// Single choice among `choices` options (2 or 4); same control for both.
  SingleChoice { choices: u8 },
  MultiSelect,
  FreeText,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PromptControl {
  Text,
  Multimedia,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
  #[error("Unsupported response type: {0}")]
  UnsupportedResponseType(String),
  #[error("Unsupported prompt type: {0}")]
  UnsupportedPromptType(String),
  #[error("Draft does not fit a {control} control: {reason}")]
  DraftMismatch { control: &'static str, reason: String },
}

impl ResponseControl {
  pub fn for_question(q: &Question) -> Result<Self, ControlError> {
    match q.response_type.as_str() {
      "singleChoice4" => Ok(ResponseControl::SingleChoice { choices: 4 }),
      "singleChoice2" => Ok(ResponseControl::SingleChoice { choices: 2 }),
      "multiSelect" => Ok(ResponseControl::MultiSelect),
      "freeText" => Ok(ResponseControl::FreeText),
      other => Err(ControlError::UnsupportedResponseType(other.to_string())),
    }
  }

  fn name(&self) -> &'static str {
    match self {
      ResponseControl::SingleChoice { .. } => "single choice",
      ResponseControl::MultiSelect => "multi select",
      ResponseControl::FreeText => "free text",
    }
  }

  /// Check a draft's shape against this control before it goes upstream.
  pub fn check_draft(&self, q: &Question, draft: &DraftValue) -> Result<(), ControlError> {
    let mismatch = |reason: String| ControlError::DraftMismatch { control: self.name(), reason };
    match (self, draft) {
      (ResponseControl::FreeText, DraftValue::Text { .. }) => Ok(()),
      (ResponseControl::FreeText, DraftValue::Options { .. }) => Err(mismatch("expected text".into())),
      (_, DraftValue::Text { .. }) => Err(mismatch("expected selected options".into())),
      (ResponseControl::SingleChoice { .. }, DraftValue::Options { selected_options }) if selected_options.len() != 1 => {
        Err(mismatch(format!("expected exactly one option, got {}", selected_options.len())))
      }
      (_, DraftValue::Options { selected_options }) => {
        // Questions that ship no option list accept any identifiers.
        if q.options.is_empty() {
          return Ok(());
        }
        match selected_options.iter().find(|s| !q.options.iter().any(|o| &o.option_id == *s)) {
          Some(unknown) => Err(mismatch(format!("unknown option {unknown}"))),
          None => Ok(()),
        }
      }
    }
  }
}

impl PromptControl {
  pub fn for_question(q: &Question) -> Result<Self, ControlError> {
    match q.prompt_type.as_str() {
      "text" => Ok(PromptControl::Text),
      "multimedia" => Ok(PromptControl::Multimedia),
      other => Err(ControlError::UnsupportedPromptType(other.to_string())),
    }
  }
}
