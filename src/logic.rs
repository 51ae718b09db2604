//! Core flows shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Loading a questionnaire through the resource cache into the store
//!   - Draft, metadata and filter edits (forwarded to the store)
//!   - Submitting an answer (pending -> upstream -> accepted / rejected)
//!   - Admin CRUD through the cache with tag invalidation

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::api::{
  create_invalidates, delete_invalidates, get_tags, list_tags, questionnaire_tags, update_invalidates,
};
use crate::cache::Tag;
use crate::controls::ResponseControl;
use crate::domain::{DraftValue, FeMeta, FilterCriteria, Questionnaire, ResourceKind, SubmitAnswer};
use crate::error::AppError;
use crate::protocol::{question_view, state_out, FilterIn, QuestionView, StateOut};
use crate::state::AppState;
use crate::store::Action;

fn questionnaire_key(id: &str) -> String { format!("{}/{}", ResourceKind::Questionnaire.path(), id) }

#[instrument(level = "info", skip(state))]
pub async fn load_questionnaire(state: &AppState, questionnaire_id: &str, force: bool) -> Result<StateOut, AppError> {
  let key = questionnaire_key(questionnaire_id);
  if force {
    state.cache.evict(&key).await;
  }
  let cached = state.cache.is_fresh(&key).await;
  let raw = state
    .cache
    .get_or_fetch(&key, |_| questionnaire_tags(questionnaire_id), || state.api.fetch_questionnaire(questionnaire_id))
    .await
    .map_err(|e| {
      error!(target: "examdesk", %questionnaire_id, error = %e, "questionnaire fetch failed");
      e
    })?;
  let questionnaire: Questionnaire = match serde_json::from_value(raw) {
    Ok(q) => q,
    Err(e) => {
      warn!(target: "examdesk", %questionnaire_id, error = %e, "malformed questionnaire; evicting");
      state.cache.evict(&key).await;
      return Err(e.into());
    }
  };
  info!(target: "examdesk", %questionnaire_id, cached, questions = questionnaire.questions.len(), "questionnaire loaded");

  let mut store = state.store.write().await;
  store.dispatch(Action::QuestionnaireLoaded(questionnaire));
  Ok(state_out(&store, false))
}

pub async fn snapshot(state: &AppState, sorted: bool) -> StateOut {
  let store = state.store.read().await;
  state_out(&store, sorted)
}

pub async fn question(state: &AppState, question_id: &str) -> Result<QuestionView, AppError> {
  let store = state.store.read().await;
  let q = store.question(question_id).ok_or_else(|| AppError::UnknownQuestion(question_id.to_string()))?;
  Ok(question_view(&store, q))
}

#[instrument(level = "debug", skip(state, draft))]
pub async fn set_draft(state: &AppState, question_id: &str, draft: DraftValue) -> Result<QuestionView, AppError> {
  let mut store = state.store.write().await;
  if store.question(question_id).is_none() {
    return Err(AppError::UnknownQuestion(question_id.to_string()));
  }
  let question_id = question_id.to_string();
  store.dispatch(match draft {
    DraftValue::Text { text } => Action::SetDraftText { question_id: question_id.clone(), text },
    DraftValue::Options { selected_options } => Action::SetDraftOptions { question_id: question_id.clone(), options: selected_options },
  });
  let q = store.question(&question_id).ok_or_else(|| AppError::UnknownQuestion(question_id.clone()))?;
  Ok(question_view(&store, q))
}

#[instrument(level = "debug", skip(state))]
pub async fn clear_draft(state: &AppState, question_id: &str) -> Result<QuestionView, AppError> {
  let mut store = state.store.write().await;
  store.dispatch(Action::ClearDraft { question_id: question_id.to_string() });
  let q = store.question(question_id).ok_or_else(|| AppError::UnknownQuestion(question_id.to_string()))?;
  Ok(question_view(&store, q))
}

#[instrument(level = "debug", skip(state, meta))]
pub async fn update_meta(state: &AppState, question_id: &str, meta: FeMeta) -> Result<QuestionView, AppError> {
  let mut store = state.store.write().await;
  store.dispatch(Action::UpdateFeMeta { question_id: question_id.to_string(), meta });
  let q = store.question(question_id).ok_or_else(|| AppError::UnknownQuestion(question_id.to_string()))?;
  Ok(question_view(&store, q))
}

pub async fn set_filter(state: &AppState, f: FilterIn) -> FilterCriteria {
  let mut store = state.store.write().await;
  if let Some(show) = f.show_skipped {
    store.dispatch(Action::SetShowSkipped(show));
  }
  if let Some(tag) = f.tag_filter {
    store.dispatch(Action::SetTagFilter(tag));
  }
  store.filter().clone()
}

pub async fn filter(state: &AppState) -> FilterCriteria { state.store.read().await.filter().clone() }

/// Submit the current draft for `question_id`.
///
/// The store lock is released across the upstream call. On success the answer
/// lands in history and the draft is dropped; on failure the draft stays.
/// Returns `None` when the question left the store (a different questionnaire
/// was loaded) before the upstream accepted the answer.
#[instrument(level = "info", skip(state), fields(submission = %Uuid::new_v4()))]
pub async fn submit_answer(state: &AppState, question_id: &str) -> Result<Option<QuestionView>, AppError> {
  let (questionnaire_id, body) = {
    let mut store = state.store.write().await;
    let questionnaire_id = store.questionnaire_id().ok_or(AppError::NoQuestionnaire)?.to_string();
    let q = store.question(question_id).ok_or_else(|| AppError::UnknownQuestion(question_id.to_string()))?;
    if store.is_in_flight(question_id) {
      return Err(AppError::SubmissionInFlight(question_id.to_string()));
    }
    let draft = store.draft(question_id).cloned().ok_or_else(|| AppError::NoDraft(question_id.to_string()))?;
    ResponseControl::for_question(q)?.check_draft(q, &draft)?;
    let body = SubmitAnswer {
      question_id: question_id.to_string(),
      user_response_type: q.response_type.clone(),
      user_response: draft,
    };
    store.dispatch(Action::SubmissionPending { question_id: question_id.to_string() });
    (questionnaire_id, body)
  };

  let result = state.api.submit_answer(&questionnaire_id, &body).await;

  let mut store = state.store.write().await;
  match result {
    Ok(mut ack) => {
      info!(target: "examdesk", %question_id, response_id = %ack.system_user_response_id, "answer accepted");
      if ack.question_id != question_id {
        warn!(target: "examdesk", %question_id, acked = %ack.question_id, "ack names another question; recording under the submitted one");
        ack.question_id = question_id.to_string();
      }
      store.dispatch(Action::SubmissionAccepted(ack));
    }
    Err(e) => {
      error!(target: "examdesk", %question_id, error = %e, "answer submission failed");
      store.dispatch(Action::SubmissionRejected { question_id: question_id.to_string() });
      return Err(e.into());
    }
  }
  match store.question(question_id) {
    Some(q) => Ok(Some(question_view(&store, q))),
    None => {
      warn!(target: "examdesk", %question_id, "answer accepted after its questionnaire was replaced");
      Ok(None)
    }
  }
}

// -------- Admin resources --------

pub fn admin_kind(segment: &str) -> Result<ResourceKind, AppError> {
  ResourceKind::from_admin_path(segment).ok_or_else(|| AppError::UnknownResource(segment.to_string()))
}

#[instrument(level = "info", skip(state))]
pub async fn admin_list(state: &AppState, kind: ResourceKind) -> Result<Value, AppError> {
  let v = state
    .cache
    .get_or_fetch(kind.path(), |v| list_tags(kind, v), || state.api.list(kind))
    .await?;
  Ok(v)
}

#[instrument(level = "info", skip(state))]
pub async fn admin_get(state: &AppState, kind: ResourceKind, id: &str) -> Result<Value, AppError> {
  let key = format!("{}/{}", kind.path(), id);
  let v = state
    .cache
    .get_or_fetch(&key, |_| get_tags(kind, id), || state.api.get(kind, id))
    .await?;
  Ok(v)
}

/// Mark every cached query of `kind` stale so subscribers refetch.
#[instrument(level = "info", skip(state))]
pub async fn admin_refresh(state: &AppState, kind: ResourceKind) -> Vec<String> {
  state.cache.invalidate(&[Tag::kind(kind)]).await
}

#[instrument(level = "info", skip(state, body))]
pub async fn admin_create(state: &AppState, kind: ResourceKind, body: Value) -> Result<Value, AppError> {
  let created = state.api.create(kind, &body).await?;
  state.cache.invalidate(&create_invalidates(kind)).await;
  Ok(created)
}

#[instrument(level = "info", skip(state, body))]
pub async fn admin_update(state: &AppState, kind: ResourceKind, id: &str, body: Value) -> Result<Value, AppError> {
  let updated = state.api.update(kind, id, &body).await?;
  state.cache.invalidate(&update_invalidates(kind, id)).await;
  Ok(updated)
}

#[instrument(level = "info", skip(state))]
pub async fn admin_delete(state: &AppState, kind: ResourceKind, id: &str) -> Result<(), AppError> {
  state.api.delete(kind, id).await?;
  state.cache.invalidate(&delete_invalidates(kind, id)).await;
  Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::api::tests::spawn_upstream;
  use crate::config::DeskConfig;
  use serde_json::json;

  pub(crate) async fn app_state() -> AppState {
    let base = spawn_upstream().await;
    AppState::with_config(DeskConfig { upstream_base_url: base, ..DeskConfig::default() }).unwrap()
  }

  #[tokio::test]
  async fn load_then_answer_free_text() {
    let state = app_state().await;
    let out = load_questionnaire(&state, "qn1", false).await.unwrap();
    assert_eq!(out.total_questions, 3);
    assert_eq!(out.exam_meta_data, Some(json!({ "title": "Geo 101" })));

    set_draft(&state, "q1", DraftValue::text("A")).await.unwrap();
    assert!(!state.store.read().await.is_editing());
    let view = submit_answer(&state, "q1").await.unwrap().unwrap();

    let store = state.store.read().await;
    assert!(!store.is_editing());
    assert!(store.draft("q1").is_none());
    let history = &store.question("q1").unwrap().user_response_history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question_id, "q1");
    assert_eq!(history[0].user_response, DraftValue::text("A"));
    assert_eq!(view.current_response.unwrap().system_user_response_id, "r-q1");
  }

  #[tokio::test]
  async fn failed_submission_keeps_draft_and_clears_editing() {
    let state = app_state().await;
    load_questionnaire(&state, "qn1", false).await.unwrap();
    set_draft(&state, "q1", DraftValue::text("fail")).await.unwrap();
    let err = submit_answer(&state, "q1").await.unwrap_err();
    assert!(matches!(err, AppError::Upstream(_)));
    let store = state.store.read().await;
    assert!(!store.is_editing());
    assert_eq!(store.draft("q1"), Some(&DraftValue::text("fail")));
    assert!(store.question("q1").unwrap().user_response_history.is_empty());
  }

  #[tokio::test]
  async fn submission_checks_draft_and_control() {
    let state = app_state().await;
    load_questionnaire(&state, "qn1", false).await.unwrap();
    assert!(matches!(submit_answer(&state, "q1").await, Err(AppError::NoDraft(_))));
    assert!(matches!(submit_answer(&state, "zz").await, Err(AppError::UnknownQuestion(_))));

    set_draft(&state, "q2", DraftValue::text("yes")).await.unwrap();
    assert!(matches!(submit_answer(&state, "q2").await, Err(AppError::Control(_))));

    set_draft(&state, "q3", DraftValue::text("x")).await.unwrap();
    assert!(matches!(submit_answer(&state, "q3").await, Err(AppError::Control(_))));
    assert!(!state.store.read().await.is_editing());

    set_draft(&state, "q2", DraftValue::options(vec!["b".into()])).await.unwrap();
    let v = submit_answer(&state, "q2").await.unwrap().unwrap();
    assert_eq!(v.current_response.unwrap().user_response, DraftValue::options(vec!["b".into()]));
  }

  #[tokio::test]
  async fn ack_for_another_id_still_settles_the_submission() {
    let state = app_state().await;
    load_questionnaire(&state, "qn1", false).await.unwrap();
    set_draft(&state, "q1", DraftValue::text("mismatch")).await.unwrap();
    let view = submit_answer(&state, "q1").await.unwrap().unwrap();
    assert!(view.draft.is_none());

    let store = state.store.read().await;
    assert!(!store.is_editing());
    assert!(!store.is_in_flight("q1"));
    let history = &store.question("q1").unwrap().user_response_history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question_id, "q1");
  }

  #[tokio::test]
  async fn answer_accepted_after_reload_is_not_an_error() {
    let state = app_state().await;
    load_questionnaire(&state, "qn1", false).await.unwrap();
    set_draft(&state, "q1", DraftValue::text("slow")).await.unwrap();

    let (submitted, reloaded) = tokio::join!(submit_answer(&state, "q1"), async {
      tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      load_questionnaire(&state, "qn2", false).await
    });
    reloaded.unwrap();
    assert!(submitted.unwrap().is_none());

    let store = state.store.read().await;
    assert_eq!(store.questionnaire_id(), Some("qn2"));
    assert!(!store.is_editing());
  }

  #[tokio::test]
  async fn filter_and_meta_drive_visible_list() {
    let state = app_state().await;
    load_questionnaire(&state, "qn1", false).await.unwrap();
    update_meta(&state, "q1", FeMeta { user_flags: Some("important".into()), ..FeMeta::default() }).await.unwrap();
    update_meta(&state, "q2", FeMeta { is_skipped: Some(true), user_flags: Some("important".into()), ..FeMeta::default() }).await.unwrap();
    assert!(matches!(update_meta(&state, "zz", FeMeta::default()).await, Err(AppError::UnknownQuestion(_))));

    set_filter(&state, FilterIn { show_skipped: None, tag_filter: Some("important".into()) }).await;
    let ids: Vec<String> = snapshot(&state, false).await.visible.into_iter().map(|v| v.question_id).collect();
    assert_eq!(ids, vec!["q1"]);

    let f = set_filter(&state, FilterIn { show_skipped: Some(true), tag_filter: None }).await;
    assert_eq!(f, FilterCriteria { show_skipped: true, tag_filter: "important".into() });
    let ids: Vec<String> = snapshot(&state, false).await.visible.into_iter().map(|v| v.question_id).collect();
    assert_eq!(ids, vec!["q1", "q2"]);
  }

  #[tokio::test]
  async fn questionnaire_served_from_cache_until_forced() {
    let state = app_state().await;
    load_questionnaire(&state, "qn1", false).await.unwrap();
    assert!(state.cache.is_fresh("questionnaires/qn1").await);
    load_questionnaire(&state, "qn1", true).await.unwrap();
    assert!(state.cache.is_fresh("questionnaires/qn1").await);
    assert!(matches!(load_questionnaire(&state, "missing", false).await, Err(AppError::Upstream(_))));
  }

  #[tokio::test]
  async fn malformed_questionnaire_is_not_cached() {
    let state = app_state().await;
    assert!(matches!(load_questionnaire(&state, "broken", false).await, Err(AppError::MalformedPayload(_))));
    assert!(!state.cache.is_fresh("questionnaires/broken").await);
  }

  #[tokio::test]
  async fn admin_mutations_invalidate_cached_queries() {
    let state = app_state().await;
    let mut rx = state.cache.subscribe();
    let kind = admin_kind("courses").unwrap();
    let list = admin_list(&state, kind).await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 2);
    admin_get(&state, kind, "1").await.unwrap();
    admin_get(&state, kind, "c2").await.unwrap();

    admin_update(&state, kind, "1", json!({ "id": 1, "name": "Algebra II" })).await.unwrap();
    let ev = rx.recv().await.unwrap();
    assert_eq!(ev.keys, vec!["courses".to_string(), "courses/1".to_string()]);
    assert!(state.cache.is_fresh("courses/c2").await);

    admin_create(&state, kind, json!({ "name": "Calculus" })).await.unwrap();
    admin_list(&state, kind).await.unwrap();
    admin_delete(&state, kind, "c2").await.unwrap();
    assert!(!state.cache.is_fresh("courses/c2").await);

    admin_list(&state, kind).await.unwrap();
    admin_get(&state, kind, "1").await.unwrap();
    assert_eq!(admin_refresh(&state, kind).await, vec!["courses".to_string(), "courses/1".to_string()]);

    assert!(matches!(admin_kind("questionnaires"), Err(AppError::UnknownResource(_))));
  }
}
