//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request and
//! push cache invalidations as they happen.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, error, instrument, debug, warn};
use uuid::Uuid;

use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "examdesk", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state), fields(conn = %Uuid::new_v4()))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "examdesk", "WebSocket connected");
  let mut invalidations = state.cache.subscribe();
  loop {
    let reply_msg = tokio::select! {
      msg = socket.recv() => match msg {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "examdesk", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => continue,
        Some(Err(e)) => {
          warn!(target: "examdesk", error = %e, "WS receive error");
          break;
        }
      },
      ev = invalidations.recv() => match ev {
        Ok(ev) => ServerWsMessage::from(ev),
        Err(RecvError::Lagged(n)) => {
          warn!(target: "examdesk", skipped = n, "WS invalidation stream lagged");
          continue;
        }
        Err(RecvError::Closed) => continue,
      },
    };

    let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });

    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "examdesk", error = %e, "WS send error");
      break;
    }
  }
  info!(target: "examdesk", "WebSocket disconnected");
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,

    ClientWsMessage::LoadQuestionnaire { questionnaire_id, force } => logic::load_questionnaire(state, &questionnaire_id, force)
      .await
      .map(|state| ServerWsMessage::State { state }),

    ClientWsMessage::GetState { sorted } => Ok(ServerWsMessage::State { state: logic::snapshot(state, sorted).await }),

    ClientWsMessage::SetDraft { question_id, draft } => logic::set_draft(state, &question_id, draft)
      .await
      .map(|question| ServerWsMessage::Question { question }),

    ClientWsMessage::ClearDraft { question_id } => logic::clear_draft(state, &question_id)
      .await
      .map(|question| ServerWsMessage::Question { question }),

    ClientWsMessage::SubmitAnswer { question_id } => match logic::submit_answer(state, &question_id).await {
      Ok(Some(question)) => Ok(ServerWsMessage::Question { question }),
      Ok(None) => Ok(ServerWsMessage::State { state: logic::snapshot(state, false).await }),
      Err(e) => Err(e),
    },

    ClientWsMessage::UpdateMeta { question_id, meta } => logic::update_meta(state, &question_id, meta)
      .await
      .map(|question| ServerWsMessage::Question { question }),

    ClientWsMessage::SetFilter(f) => Ok(ServerWsMessage::Filter { filter: logic::set_filter(state, f).await }),
  };

  result.unwrap_or_else(|e| {
    error!(target: "examdesk", error = %e, "WS request failed");
    ServerWsMessage::Error { message: e.to_string() }
  })
}
