//! Request rate limiting.
//!
//! Counters use fixed windows: the first hit on a key opens a window of
//! `window_seconds`, later hits in the same window count against `max`. The
//! configuration row and each user's tier are cached for five minutes so
//! the store is not read on every request.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::RwLock;
use tokio::time::Instant;

use funmagic_core::{LimitCategory, RateLimitConfig, RateLimitLimitEntry, ResolvedTier, UserId};
use funmagic_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// How long the configuration and user tiers stay cached.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Number of tracked windows above which expired ones are swept.
const SWEEP_THRESHOLD: usize = 10_000;

// ============================================================================
// Fixed-window counter
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    resets_at: Instant,
}

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Requests allowed in the window.
    pub limit: u32,
    /// Requests left in the window.
    pub remaining: u32,
    /// Time until the window closes.
    pub reset_after: Duration,
    /// Whether this request is within the limit.
    pub allowed: bool,
}

impl RateLimitDecision {
    /// Seconds until the window closes, rounded up.
    #[must_use]
    pub fn reset_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Write the `X-RateLimit-*` headers, plus `Retry-After` when rejected.
    ///
    /// Headers already written by an inner, more specific limiter are kept.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        if self.allowed && headers.contains_key("x-ratelimit-limit") {
            return;
        }

        let reset_after = self.reset_after_secs();
        let reset_at = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0) + reset_after;

        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at));
        if !self.allowed {
            headers.insert("retry-after", HeaderValue::from(reset_after));
        }
    }
}

/// In-process fixed-window counters keyed by `{prefix}:{identifier}`.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    /// Create a limiter with no open windows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `key`.
    pub fn hit(&self, key: &str, limit: RateLimitLimitEntry) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| w.resets_at > now);
        }

        let window = windows
            .entry(key.to_string())
            .and_modify(|w| {
                if w.resets_at <= now {
                    *w = Window {
                        count: 0,
                        resets_at: now + Duration::from_secs(u64::from(limit.window_seconds)),
                    };
                }
            })
            .or_insert_with(|| Window {
                count: 0,
                resets_at: now + Duration::from_secs(u64::from(limit.window_seconds)),
            });
        window.count = window.count.saturating_add(1);

        RateLimitDecision {
            limit: limit.max,
            remaining: limit.max.saturating_sub(window.count),
            reset_after: window.resets_at.saturating_duration_since(now),
            allowed: window.count <= limit.max,
        }
    }
}

// ============================================================================
// Caches
// ============================================================================

/// Map whose entries expire a fixed time after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (V, Instant)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached value, if present and fresh.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    /// Store a value.
    pub async fn insert(&self, key: K, value: V) {
        self.entries.write().await.insert(key, (value, Instant::now()));
    }

    /// Drop one entry.
    pub async fn remove(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Rate-limit state shared by the middlewares.
#[derive(Debug)]
pub struct RateLimiter {
    /// Request counters.
    pub counters: FixedWindowLimiter,
    config: TtlCache<(), Arc<RateLimitConfig>>,
    tiers: TtlCache<UserId, ResolvedTier>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a limiter with empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: FixedWindowLimiter::new(),
            config: TtlCache::new(CACHE_TTL),
            tiers: TtlCache::new(CACHE_TTL),
        }
    }

    /// The active configuration: the stored row, or the default when none
    /// was ever saved.
    pub async fn config(&self, store: &dyn Store) -> Result<Arc<RateLimitConfig>, ApiError> {
        if let Some(config) = self.config.get(&()).await {
            return Ok(config);
        }

        let config = Arc::new(
            store
                .get_rate_limit_settings()?
                .map(|settings| settings.config)
                .unwrap_or_default(),
        );
        self.config.insert((), Arc::clone(&config)).await;
        Ok(config)
    }

    /// Forget the cached configuration and every cached tier.
    pub async fn invalidate_config(&self) {
        self.config.clear().await;
        self.tiers.clear().await;
    }

    /// The tier a user's purchase volume earns under `config`.
    pub async fn tier(
        &self,
        store: &dyn Store,
        config: &RateLimitConfig,
        user_id: &UserId,
    ) -> Result<ResolvedTier, ApiError> {
        if let Some(tier) = self.tiers.get(user_id).await {
            return Ok(tier);
        }

        let lifetime_purchased = store
            .get_credit(user_id)?
            .map_or(0, |credit| credit.lifetime_purchased);
        let tier = config.resolve_tier(lifetime_purchased);
        self.tiers.insert(*user_id, tier.clone()).await;
        Ok(tier)
    }

    /// Forget a user's cached tier after their purchase volume changed.
    pub async fn invalidate_user(&self, user_id: &UserId) {
        self.tiers.remove(user_id).await;
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Client address from `x-forwarded-for` (first entry), then `x-real-ip`.
#[must_use]
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("unknown")
        .to_string()
}

async fn enforce(
    state: &AppState,
    category: LimitCategory,
    identifier: &str,
    limit: RateLimitLimitEntry,
    request: Request,
    next: Next,
) -> Response {
    let key = format!("{}:{identifier}", category.key_prefix());
    let decision = state.rate_limiter.counters.hit(&key, limit);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(
            key = %key,
            limit = decision.limit,
            retry_after = decision.reset_after_secs(),
            "Rate limit exceeded"
        );
        ApiError::RateLimited.into_response()
    };

    decision.apply_headers(response.headers_mut());
    response
}

/// Per-IP ceiling on the whole API.
pub async fn global_api_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let config = state.rate_limiter.config(state.store.as_ref()).await?;
    let ip = client_ip(request.headers());
    let limit = config.limits.get(LimitCategory::GlobalApi);
    Ok(enforce(&state, LimitCategory::GlobalApi, &ip, limit, request, next).await)
}

/// Per-IP limit on upload handshakes.
pub async fn upload_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let config = state.rate_limiter.config(state.store.as_ref()).await?;
    let ip = client_ip(request.headers());
    let limit = config.limits.get(LimitCategory::Upload);
    Ok(enforce(&state, LimitCategory::Upload, &ip, limit, request, next).await)
}

/// Per-user API limit, scaled by the user's tier.
///
/// Runs after [`crate::auth::require_auth`], which stores the [`AuthUser`]
/// in the request extensions.
pub async fn user_api_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = request
        .extensions()
        .get::<AuthUser>()
        .map(|user| user.user_id)
        .ok_or(ApiError::Unauthorized)?;

    let config = state.rate_limiter.config(state.store.as_ref()).await?;
    let tier = state
        .rate_limiter
        .tier(state.store.as_ref(), &config, &user_id)
        .await?;
    let limit = config.limit_for_tier(LimitCategory::UserApi, &tier);

    Ok(enforce(
        &state,
        LimitCategory::UserApi,
        &user_id.to_string(),
        limit,
        request,
        next,
    )
    .await)
}
