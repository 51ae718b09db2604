use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use thiserror::Error;

use crate::controls::ControlError;

/// Failures talking to the upstream assessment API.
#[derive(Error, Debug)]
pub enum ApiError {
  #[error("Upstream transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("Upstream HTTP {status}: {message}")]
  Status { status: u16, message: String },
}

#[derive(Error, Debug)]
pub enum AppError {
  #[error("No questionnaire loaded")]
  NoQuestionnaire,

  #[error("Unknown question: {0}")]
  UnknownQuestion(String),

  #[error("No draft response for question {0}")]
  NoDraft(String),

  #[error("A submission for question {0} is already in flight")]
  SubmissionInFlight(String),

  #[error("Unknown resource kind: {0}")]
  UnknownResource(String),

  #[error(transparent)]
  Control(#[from] ControlError),

  #[error("There was an error talking to the server: {0}")]
  Upstream(#[from] ApiError),

  #[error("Malformed upstream payload: {0}")]
  MalformedPayload(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = match &self {
      AppError::NoQuestionnaire | AppError::NoDraft(_) | AppError::Control(_) => StatusCode::BAD_REQUEST,
      AppError::UnknownQuestion(_) | AppError::UnknownResource(_) => StatusCode::NOT_FOUND,
      AppError::SubmissionInFlight(_) => StatusCode::CONFLICT,
      AppError::Upstream(ApiError::Status { status: 404, .. }) => StatusCode::NOT_FOUND,
      AppError::Upstream(_) | AppError::MalformedPayload(_) => StatusCode::BAD_GATEWAY,
    };

    (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
  }
}
