//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::handlers::{admin, credits, health, internal, rate_limit, upload};
use crate::rate_limit::{global_api_limit, upload_limit, user_api_limit};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for the `/v1` API.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## User (JWT auth, per-user rate limit)
/// - `GET /v1/credits/balance` - Get current balance
/// - `GET /v1/credits/transactions` - List transaction history
/// - `GET /v1/rate-limit/me` - Resolved tier and effective limits
/// - `GET /v1/upload/download-url` - Presigned URL for an own private object
///
/// ## Upload (JWT auth, per-IP upload limit)
/// - `POST /v1/upload/presign` - Presigned upload URL
///
/// ## Admin (JWT auth, admin role)
/// - `GET /v1/admin/users/:id/credits` - User credits and recent history
/// - `POST /v1/admin/users/:id/credits` - Adjust a user's credits
/// - `GET /v1/admin/settings/rate-limit` - Rate-limit configuration
/// - `PUT /v1/admin/settings/rate-limit` - Replace rate-limit configuration
///
/// ## Internal (Service API key auth)
/// - `POST /v1/internal/credits/grant` - Grant credits
/// - `POST /v1/internal/credits/reserve` - Reserve credits for a task
/// - `POST /v1/internal/credits/confirm` - Charge a task's reservation
/// - `POST /v1/internal/credits/release` - Return a task's reservation
///
/// Everything under `/v1` is also subject to the per-IP global limit.
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Route layers run outermost-last: authentication before the per-user limit.
    let user_routes = Router::new()
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        .route("/rate-limit/me", get(rate_limit::get_my_limits))
        .route("/upload/download-url", get(upload::download_url))
        .route_layer(from_fn_with_state(state.clone(), user_api_limit))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let upload_routes = Router::new()
        .route("/upload/presign", post(upload::presign))
        .route_layer(from_fn_with_state(state.clone(), upload_limit));

    let admin_routes = Router::new()
        .route(
            "/users/:id/credits",
            get(admin::get_user_credits).post(admin::adjust_user_credits),
        )
        .route(
            "/settings/rate-limit",
            get(rate_limit::get_settings).put(rate_limit::update_settings),
        );

    let internal_routes = Router::new()
        .route("/grant", post(internal::grant))
        .route("/reserve", post(internal::reserve))
        .route("/confirm", post(internal::confirm))
        .route("/release", post(internal::release));

    let api_routes = Router::new()
        .merge(user_routes)
        .merge(upload_routes)
        .nest("/admin", admin_routes)
        .nest("/internal/credits", internal_routes)
        .layer(from_fn_with_state(state.clone(), global_api_limit))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Global middleware
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
        ))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
