//! Application state.

use std::sync::Arc;

use funmagic_store::Store;

use crate::auth::JwksCache;
use crate::config::ServiceConfig;
use crate::rate_limit::RateLimiter;
use crate::storage::Presigner;

/// Application state shared across handlers.
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Upload URL signer (optional).
    pub presigner: Option<Presigner>,

    /// Counters and cached rate-limit configuration.
    pub rate_limiter: RateLimiter,

    /// Auth provider signing keys.
    pub jwks: JwksCache,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let presigner = config.storage.clone().and_then(|storage| {
            let endpoint = storage.endpoint.clone();
            match Presigner::new(storage) {
                Ok(presigner) => {
                    tracing::info!(endpoint = %endpoint, "Object storage enabled");
                    Some(presigner)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to configure object storage");
                    None
                }
            }
        });

        if presigner.is_none() {
            tracing::warn!("Object storage not configured - uploads will be unavailable");
        }

        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not set - internal credits API is disabled");
        }

        Self {
            store,
            config,
            presigner,
            rate_limiter: RateLimiter::new(),
            jwks: JwksCache::new(),
        }
    }

    /// Check if object storage is configured.
    #[must_use]
    pub fn has_storage(&self) -> bool {
        self.presigner.is_some()
    }
}
