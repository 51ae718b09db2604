//! Application state: the questionnaire store, the resource cache and the upstream client.
//!
//! The store is the single owner of questionnaire state; handlers take the lock,
//! dispatch, and release it before any network call.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::api::UpstreamApi;
use crate::cache::ResourceCache;
use crate::config::{load_config_from_env, DeskConfig};
use crate::error::ApiError;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
    pub cache: Arc<ResourceCache>,
    pub api: UpstreamApi,
    pub config: DeskConfig,
}

impl AppState {
    /// Build state from env: load config, build the upstream client, empty store and cache.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Result<Self, ApiError> {
        Self::with_config(load_config_from_env())
    }

    pub fn with_config(config: DeskConfig) -> Result<Self, ApiError> {
        let api = UpstreamApi::from_config(&config)?;
        info!(
            target: "examdesk",
            base_url = %api.base_url,
            timeout_secs = config.upstream_timeout_secs,
            authenticated = config.upstream_token.is_some(),
            "Upstream API configured"
        );
        Ok(Self {
            store: Arc::new(RwLock::new(Store::new())),
            cache: Arc::new(ResourceCache::new()),
            api,
            config,
        })
    }
}
