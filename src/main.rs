//! examdesk · Assessment front-end session service
//!
//! - Axum HTTP + WebSocket API over the questionnaire store
//! - Admin resources proxied through a tag-invalidated cache
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   UPSTREAM_BASE_URL     : assessment REST API, default "http://localhost:8080/api"
//!   UPSTREAM_TOKEN        : bearer token sent upstream if present
//!   UPSTREAM_TIMEOUT_SECS : per-request timeout (default 20)
//!   STATIC_DIR            : SPA bundle directory (default "./static")
//!   DESK_CONFIG_PATH      : optional TOML file with the same keys (lower case)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod filter;
mod store;
mod controls;
mod cache;
mod api;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (store, cache, upstream client).
  let state = Arc::new(AppState::from_env()?);
  let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));

  // HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  let listener = TcpListener::bind(addr).await?;
  info!(target: "examdesk", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "examdesk", error = %e, "Failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!(target: "examdesk", "Shutdown signal received");
}
