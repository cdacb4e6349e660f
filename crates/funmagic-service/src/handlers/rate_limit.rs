//! Rate-limit settings handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use funmagic_core::{
    LimitCategory, RateLimitConfig, RateLimitLimitEntry, RateLimitSettings, ResolvedTier,
};
use funmagic_store::Store;

use crate::auth::{AdminUser, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// The caller's tier and the limits it yields.
#[derive(Debug, Serialize)]
pub struct MyRateLimitResponse {
    /// Resolved tier.
    pub tier: ResolvedTier,
    /// Effective limit per category, keyed by camelCase category name.
    pub limits: BTreeMap<LimitCategory, RateLimitLimitEntry>,
}

/// Get the caller's tier and effective limits.
pub async fn get_my_limits(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<MyRateLimitResponse>, ApiError> {
    let config = state.rate_limiter.config(state.store.as_ref()).await?;
    let tier = state
        .rate_limiter
        .tier(state.store.as_ref(), &config, &auth.user_id)
        .await?;

    let limits = LimitCategory::ALL
        .into_iter()
        .map(|category| (category, config.limit_for_tier(category, &tier)))
        .collect();

    Ok(Json(MyRateLimitResponse { tier, limits }))
}

/// Rate-limit configuration envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct RateLimitConfigBody {
    /// The configuration.
    pub config: RateLimitConfig,
}

/// Get the active rate-limit configuration.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<RateLimitConfigBody>, ApiError> {
    let config = state
        .store
        .get_rate_limit_settings()?
        .map(|settings| settings.config)
        .unwrap_or_default();

    Ok(Json(RateLimitConfigBody { config }))
}

/// Replace the rate-limit configuration.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(body): Json<RateLimitConfigBody>,
) -> Result<Json<RateLimitConfigBody>, ApiError> {
    body.config.validate()?;

    state.store.put_rate_limit_settings(&RateLimitSettings {
        config: body.config.clone(),
        updated_at: chrono::Utc::now(),
    })?;
    state.rate_limiter.invalidate_config().await;

    tracing::info!(
        admin_id = %admin.user_id,
        tiers = body.config.tiers.len(),
        "Rate limit configuration updated"
    );

    Ok(Json(body))
}
