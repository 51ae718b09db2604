//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Invalidation;
use crate::controls::{PromptControl, ResponseControl};
use crate::domain::{AcceptedResponse, DraftValue, FeMeta, FilterCriteria, Question, ResponseOption};
use crate::store::Store;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    LoadQuestionnaire {
        #[serde(rename = "questionnaireId")]
        questionnaire_id: String,
        #[serde(default)]
        force: bool,
    },
    GetState {
        #[serde(default)]
        sorted: bool,
    },
    SetDraft {
        #[serde(rename = "questionId")]
        question_id: String,
        draft: DraftValue,
    },
    ClearDraft {
        #[serde(rename = "questionId")]
        question_id: String,
    },
    SubmitAnswer {
        #[serde(rename = "questionId")]
        question_id: String,
    },
    UpdateMeta {
        #[serde(rename = "questionId")]
        question_id: String,
        meta: FeMeta,
    },
    SetFilter(FilterIn),
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    State {
        state: StateOut,
    },
    Question {
        question: QuestionView,
    },
    Filter {
        filter: FilterCriteria,
    },
    /// Pushed when cached resources went stale; clients refetch the keys they show.
    Invalidated {
        keys: Vec<String>,
    },
    Error {
        message: String,
    },
}

impl From<Invalidation> for ServerWsMessage {
    fn from(ev: Invalidation) -> Self {
        ServerWsMessage::Invalidated { keys: ev.keys }
    }
}

/// Everything a questionnaire page needs in one read.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOut {
    pub questionnaire_id: Option<String>,
    pub exam_meta_data: Option<Value>,
    pub is_editing: bool,
    pub filter: FilterCriteria,
    pub total_questions: usize,
    /// Questions with an unsubmitted draft, visible or not.
    pub pending_drafts: usize,
    pub visible: Vec<QuestionView>,
}

/// One question as rendered: selected controls (or an inline error), draft and answers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub question_id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub prompt_control: Value,
    pub response_control: Value,
    pub options: Vec<ResponseOption>,
    pub fe_meta: FeMeta,
    pub draft: Option<DraftValue>,
    pub current_response: Option<AcceptedResponse>,
    pub previous_responses: Vec<AcceptedResponse>,
    pub in_flight: bool,
    pub can_submit: bool,
}

/// Control or `{"kind":"unsupported","message":...}`; never fails the view.
fn control_out<T: Serialize>(r: Result<T, crate::controls::ControlError>) -> Value {
    match r {
        Ok(c) => serde_json::to_value(c).unwrap_or(Value::Null),
        Err(e) => serde_json::json!({ "kind": "unsupported", "message": e.to_string() }),
    }
}

pub fn question_view(store: &Store, q: &Question) -> QuestionView {
    let response_control = ResponseControl::for_question(q);
    let draft = store.draft(&q.question_id).cloned();
    // Submit is disabled globally while any submission is in flight.
    let can_submit = response_control.is_ok() && draft.is_some() && !store.is_editing();
    QuestionView {
        question_id: q.question_id.clone(),
        prompt: q.prompt.clone(),
        media_url: q.media_url.clone(),
        prompt_control: control_out(PromptControl::for_question(q)),
        response_control: control_out(response_control),
        options: q.options.clone(),
        fe_meta: q.fe_meta.clone(),
        draft,
        current_response: q.current_response().cloned(),
        previous_responses: q.previous_responses().to_vec(),
        in_flight: store.is_in_flight(&q.question_id),
        can_submit,
    }
}

pub fn state_out(store: &Store, sorted: bool) -> StateOut {
    let mut visible = store.visible_questions();
    if sorted {
        crate::filter::sort_by_position(&mut visible);
    }
    StateOut {
        questionnaire_id: store.questionnaire_id().map(str::to_string),
        exam_meta_data: store.exam_meta().cloned(),
        is_editing: store.is_editing(),
        filter: store.filter().clone(),
        total_questions: store.questions().len(),
        pending_drafts: store.drafts().len(),
        visible: visible.into_iter().map(|q| question_view(store, q)).collect(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Default, Deserialize)]
pub struct LoadQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StateQuery {
    #[serde(default)]
    pub sorted: bool,
}

/// Partial filter update; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterIn {
    pub show_skipped: Option<bool>,
    pub tag_filter: Option<String>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
