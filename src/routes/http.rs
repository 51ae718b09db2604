//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures map to JSON `{error}` via `AppError`.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::Value;
use tracing::{info, instrument};

use crate::domain::{DraftValue, FeMeta};
use crate::error::AppError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_load_questionnaire(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<LoadQuery>,
) -> Result<Json<StateOut>, AppError> {
  let out = logic::load_questionnaire(&state, &id, q.force).await?;
  info!(target: "examdesk", %id, visible = out.visible.len(), "HTTP questionnaire served");
  Ok(Json(out))
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_state(State(state): State<Arc<AppState>>, Query(q): Query<StateQuery>) -> Json<StateOut> {
  Json(logic::snapshot(&state, q.sorted).await)
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_questions(State(state): State<Arc<AppState>>, Query(q): Query<StateQuery>) -> Json<Vec<QuestionView>> {
  Json(logic::snapshot(&state, q.sorted).await.visible)
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<QuestionView>, AppError> {
  Ok(Json(logic::question(&state, &id).await?))
}

#[instrument(level = "debug", skip(state, draft))]
pub async fn http_put_draft(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(draft): Json<DraftValue>,
) -> Result<Json<QuestionView>, AppError> {
  Ok(Json(logic::set_draft(&state, &id, draft).await?))
}

#[instrument(level = "debug", skip(state))]
pub async fn http_delete_draft(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<QuestionView>, AppError> {
  Ok(Json(logic::clear_draft(&state, &id).await?))
}

#[instrument(level = "debug", skip(state, meta))]
pub async fn http_put_meta(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(meta): Json<FeMeta>,
) -> Result<Json<QuestionView>, AppError> {
  Ok(Json(logic::update_meta(&state, &id, meta).await?))
}

/// 200 with the updated question, or 202 when the answer was accepted but the
/// question is no longer loaded.
#[instrument(level = "info", skip(state))]
pub async fn http_post_submit(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Response, AppError> {
  let view = logic::submit_answer(&state, &id).await?;
  info!(target: "examdesk", %id, "HTTP submit_answer accepted");
  Ok(match view {
    Some(view) => Json(view).into_response(),
    None => StatusCode::ACCEPTED.into_response(),
  })
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_filter(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::filter(&state).await)
}

#[instrument(level = "debug", skip(state, body))]
pub async fn http_put_filter(State(state): State<Arc<AppState>>, Json(body): Json<FilterIn>) -> impl IntoResponse {
  Json(logic::set_filter(&state, body).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_list(
  State(state): State<Arc<AppState>>,
  Path(kind): Path<String>,
) -> Result<Json<Value>, AppError> {
  let kind = logic::admin_kind(&kind)?;
  Ok(Json(logic::admin_list(&state, kind).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_refresh(
  State(state): State<Arc<AppState>>,
  Path(kind): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
  let kind = logic::admin_kind(&kind)?;
  Ok(Json(logic::admin_refresh(&state, kind).await))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_get(
  State(state): State<Arc<AppState>>,
  Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
  let kind = logic::admin_kind(&kind)?;
  Ok(Json(logic::admin_get(&state, kind, &id).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_create(
  State(state): State<Arc<AppState>>,
  Path(kind): Path<String>,
  Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
  let kind = logic::admin_kind(&kind)?;
  Ok((StatusCode::CREATED, Json(logic::admin_create(&state, kind, body).await?)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_admin_update(
  State(state): State<Arc<AppState>>,
  Path((kind, id)): Path<(String, String)>,
  Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
  let kind = logic::admin_kind(&kind)?;
  Ok(Json(logic::admin_update(&state, kind, &id, body).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_admin_delete(
  State(state): State<Arc<AppState>>,
  Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
  let kind = logic::admin_kind(&kind)?;
  logic::admin_delete(&state, kind, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}
