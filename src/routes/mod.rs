//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - questionnaire, question, filter and admin endpoints under `/api/v1/...`
/// - Static SPA from the configured directory with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Questionnaire flow
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/questionnaire/:id", get(http::http_load_questionnaire))
        .route("/api/v1/state", get(http::http_get_state))
        .route("/api/v1/questions", get(http::http_get_questions))
        .route("/api/v1/questions/:id", get(http::http_get_question))
        .route(
            "/api/v1/questions/:id/draft",
            put(http::http_put_draft).delete(http::http_delete_draft),
        )
        .route("/api/v1/questions/:id/meta", put(http::http_put_meta))
        .route("/api/v1/questions/:id/submit", post(http::http_post_submit))
        .route("/api/v1/filter", get(http::http_get_filter).put(http::http_put_filter))
        // Admin resources
        .route(
            "/api/v1/admin/:kind",
            get(http::http_admin_list).post(http::http_admin_create),
        )
        .route(
            "/api/v1/admin/:kind/:id",
            get(http::http_admin_get)
                .put(http::http_admin_update)
                .delete(http::http_admin_delete),
        )
        .route("/api/v1/refresh/:kind", post(http::http_admin_refresh))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
