//! Thin client for the upstream assessment REST API.
//!
//! Calls are instrumented and log paths, statuses and latencies (not bodies).
//! No retry: a failed call is reported to the caller once.
//!
//! Each endpoint also declares the cache tags it provides (queries) or
//! invalidates (mutations); see the `*_tags` functions below.

use std::time::{Duration, Instant};

use reqwest::{
  header::{AUTHORIZATION, USER_AGENT},
  Method, RequestBuilder,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::cache::Tag;
use crate::config::DeskConfig;
use crate::domain::{ResourceKind, SubmitAnswer, SubmitAnswerAck};
use crate::error::ApiError;
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct UpstreamApi {
  client: reqwest::Client,
  pub base_url: String,
  token: Option<String>,
}

impl UpstreamApi {
  pub fn from_config(cfg: &DeskConfig) -> Result<Self, ApiError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.upstream_timeout_secs))
      .build()?;
    Ok(Self { client, base_url: cfg.upstream_base_url.clone(), token: cfg.upstream_token.clone() })
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
    let mut req = self.client.request(method, url).header(USER_AGENT, "examdesk/0.1");
    if let Some(t) = &self.token {
      req = req.header(AUTHORIZATION, format!("Bearer {t}"));
    }
    req
  }

  /// Send and return the raw successful response, mapping non-2xx to `ApiError::Status`.
  async fn send(&self, method: Method, path: &str, body: Option<&(impl Serialize + ?Sized)>) -> Result<reqwest::Response, ApiError> {
    let started = Instant::now();
    let mut req = self.request(method.clone(), path);
    if let Some(b) = body {
      req = req.json(b);
    }
    let res = req.send().await.map_err(|e| {
      error!(target: "upstream", %method, %path, error = %e, "request failed");
      ApiError::Transport(e)
    })?;

    let status = res.status();
    info!(target: "upstream", %method, %path, status = status.as_u16(), elapsed_ms = started.elapsed().as_millis() as u64, "upstream call");
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let message = extract_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(ApiError::Status { status: status.as_u16(), message });
    }
    Ok(res)
  }

  async fn send_json<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<&(impl Serialize + ?Sized)>) -> Result<T, ApiError> {
    let res = self.send(method, path, body).await?;
    Ok(res.json::<T>().await?)
  }

  #[instrument(level = "info", skip(self))]
  pub async fn fetch_questionnaire(&self, questionnaire_id: &str) -> Result<Value, ApiError> {
    let path = format!("{}/{}", ResourceKind::Questionnaire.path(), questionnaire_id);
    self.send_json(Method::GET, &path, None::<&Value>).await
  }

  #[instrument(level = "info", skip(self, body), fields(question_id = %body.question_id, response_type = %body.user_response_type))]
  pub async fn submit_answer(&self, questionnaire_id: &str, body: &SubmitAnswer) -> Result<SubmitAnswerAck, ApiError> {
    let path = format!("{}/{}/responses", ResourceKind::Questionnaire.path(), questionnaire_id);
    let ack: SubmitAnswerAck = self.send_json(Method::POST, &path, Some(body)).await?;
    debug!(target: "upstream", response_id = %ack.system_user_response_id, "answer accepted");
    Ok(ack)
  }

  #[instrument(level = "info", skip(self))]
  pub async fn list(&self, kind: ResourceKind) -> Result<Value, ApiError> {
    self.send_json(Method::GET, kind.path(), None::<&Value>).await
  }

  #[instrument(level = "info", skip(self))]
  pub async fn get(&self, kind: ResourceKind, id: &str) -> Result<Value, ApiError> {
    self.send_json(Method::GET, &format!("{}/{}", kind.path(), id), None::<&Value>).await
  }

  #[instrument(level = "info", skip(self, body))]
  pub async fn create(&self, kind: ResourceKind, body: &Value) -> Result<Value, ApiError> {
    self.send_json(Method::POST, kind.path(), Some(body)).await
  }

  #[instrument(level = "info", skip(self, body))]
  pub async fn update(&self, kind: ResourceKind, id: &str, body: &Value) -> Result<Value, ApiError> {
    self.send_json(Method::PUT, &format!("{}/{}", kind.path(), id), Some(body)).await
  }

  /// Delete ignores any response body (204 or otherwise).
  #[instrument(level = "info", skip(self))]
  pub async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ApiError> {
    self.send(Method::DELETE, &format!("{}/{}", kind.path(), id), None::<&Value>).await?;
    Ok(())
  }
}

/// Upstream error bodies look like `{"error": "..."}` or `{"message": "..."}`.
fn extract_error(body: &str) -> Option<String> {
  let v: Value = serde_json::from_str(body).ok()?;
  v.get("error")
    .or_else(|| v.get("message"))
    .and_then(|m| m.as_str())
    .map(str::to_string)
}

/// Identifier of an admin resource item (`id`, string or number).
pub fn item_id(item: &Value) -> Option<String> {
  match item.get("id")? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

// -------- Endpoint tag declarations --------

pub fn list_tags(kind: ResourceKind, result: &Value) -> Vec<Tag> {
  let mut tags = vec![Tag::list(kind)];
  if let Some(items) = result.as_array() {
    tags.extend(items.iter().filter_map(item_id).map(|id| Tag::item(kind, id)));
  }
  tags
}

pub fn get_tags(kind: ResourceKind, id: &str) -> Vec<Tag> { vec![Tag::item(kind, id)] }

pub fn create_invalidates(kind: ResourceKind) -> Vec<Tag> { vec![Tag::list(kind)] }

pub fn update_invalidates(kind: ResourceKind, id: &str) -> Vec<Tag> { vec![Tag::list(kind), Tag::item(kind, id)] }

pub fn delete_invalidates(kind: ResourceKind, id: &str) -> Vec<Tag> { update_invalidates(kind, id) }

pub fn questionnaire_tags(questionnaire_id: &str) -> Vec<Tag> { vec![Tag::item(ResourceKind::Questionnaire, questionnaire_id)] }
