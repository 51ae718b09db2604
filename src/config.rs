//! Loading desk configuration from an optional TOML file plus env overrides.
//!
//! Precedence: env vars > TOML file (DESK_CONFIG_PATH) > defaults.

use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeskConfig {
  pub port: u16,
  /// Base URL of the upstream assessment REST API, without trailing slash.
  pub upstream_base_url: String,
  /// Bearer token sent upstream when present.
  pub upstream_token: Option<String>,
  pub upstream_timeout_secs: u64,
  /// Directory holding the SPA bundle.
  pub static_dir: String,
}

impl Default for DeskConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      upstream_base_url: "http://localhost:8080/api".into(),
      upstream_token: None,
      upstream_timeout_secs: 20,
      static_dir: "./static".into(),
    }
  }
}

/// Load from DESK_CONFIG_PATH (if set) and apply env overrides.
/// An unreadable or invalid file is logged and ignored.
pub fn load_config_from_env() -> DeskConfig {
  let base = match std::env::var("DESK_CONFIG_PATH").ok() {
    Some(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match toml::from_str::<DeskConfig>(&s) {
        Ok(cfg) => {
          info!(target: "examdesk", %path, "Loaded desk config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "examdesk", %path, error = %e, "Failed to parse TOML config; using defaults");
          DeskConfig::default()
        }
      },
      Err(e) => {
        error!(target: "examdesk", %path, error = %e, "Failed to read TOML config file; using defaults");
        DeskConfig::default()
      }
    },
    None => DeskConfig::default(),
  };
  apply_env(base, |k| std::env::var(k).ok())
}

fn apply_env(mut cfg: DeskConfig, var: impl Fn(&str) -> Option<String>) -> DeskConfig {
  if let Some(p) = var("PORT") {
    match p.parse::<u16>() {
      Ok(port) => cfg.port = port,
      Err(e) => warn!(target: "examdesk", value = %p, error = %e, "Invalid PORT; keeping {}", cfg.port),
    }
  }
  if let Some(url) = var("UPSTREAM_BASE_URL") {
    cfg.upstream_base_url = url;
  }
  if let Some(token) = var("UPSTREAM_TOKEN").filter(|t| !t.is_empty()) {
    cfg.upstream_token = Some(token);
  }
  if let Some(t) = var("UPSTREAM_TIMEOUT_SECS") {
    match t.parse::<u64>() {
      Ok(secs) => cfg.upstream_timeout_secs = secs,
      Err(e) => warn!(target: "examdesk", value = %t, error = %e, "Invalid UPSTREAM_TIMEOUT_SECS; keeping {}", cfg.upstream_timeout_secs),
    }
  }
  if let Some(dir) = var("STATIC_DIR") {
    cfg.static_dir = dir;
  }
  cfg.upstream_base_url = cfg.upstream_base_url.trim_end_matches('/').to_string();
  cfg
}
