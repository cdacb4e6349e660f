//! Authentication middleware and extractors.
//!
//! This module provides:
//! - `AuthUser` - End-user authentication via session JWT
//! - `AdminUser` - An `AuthUser` whose role is `admin` or `super_admin`
//! - `ServiceAuth` - Service-to-service authentication via API key
//! - `require_auth` - Middleware that rejects unauthenticated requests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use funmagic_core::UserId;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// How long to cache JWKS keys before refreshing.
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600); // 1 hour

/// Timeout for JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum gap between JWKS fetches triggered by an unknown `kid`.
const JWKS_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Platform role carried in the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular user.
    #[default]
    User,
    /// Administrator.
    Admin,
    /// Administrator that can also manage other administrators.
    SuperAdmin,
}

impl Role {
    /// Whether the role may use the admin API.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

/// JWT claims of a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Platform role, `user` when absent.
    #[serde(default)]
    pub role: Role,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    #[serde(default)]
    pub iat: Option<i64>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience (can be string or array).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
}

/// An authenticated user extracted from a session JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
    /// The user's platform role.
    pub role: Role,
}

/// Authenticate the bearer token in `headers`.
pub async fn authenticate(headers: &HeaderMap, state: &AppState) -> Result<AuthUser, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let claims = validate_jwt(token, state).await?;

    let user_id = claims.sub.parse::<UserId>().map_err(|_| {
        tracing::debug!(sub = %claims.sub, "JWT subject is not a user id");
        ApiError::Unauthorized
    })?;

    Ok(AuthUser {
        user_id,
        role: claims.role,
    })
}

/// Reject requests without a valid session and make the [`AuthUser`]
/// available to later middleware and handlers.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(request.headers(), &state).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            if let Some(user) = parts.extensions.get::<AuthUser>() {
                return Ok(user.clone());
            }
            authenticate(&parts.headers, state).await
        })
    }
}

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user = AuthUser::from_request_parts(parts, state).await?;
            if !user.role.is_admin() {
                tracing::warn!(user_id = %user.user_id, "Non-admin called admin API");
                return Err(ApiError::Forbidden("Admin access required".into()));
            }
            Ok(AdminUser(user))
        })
    }
}

/// Service authentication via API key.
///
/// Used by the task runner and payment webhooks to move credits.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let api_key = parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let expected_key = state
                .config
                .service_api_key
                .as_ref()
                .ok_or(ApiError::Unauthorized)?;

            if !constant_time_eq(api_key, expected_key) {
                return Err(ApiError::Unauthorized);
            }

            let service_name = parts
                .headers
                .get("x-service-name")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            Ok(ServiceAuth { service_name })
        })
    }
}

// ============================================================================
// JWKS Client and JWT Validation
// ============================================================================

/// JWKS (JSON Web Key Set) response structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    /// List of JWK keys.
    pub keys: Vec<Jwk>,
}

/// Single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA` or `OKP`).
    pub kty: String,
    /// Key ID.
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256").
    pub alg: Option<String>,
    /// RSA public key modulus (base64url encoded).
    pub n: Option<String>,
    /// RSA public key exponent (base64url encoded).
    pub e: Option<String>,
    /// OKP curve (e.g., "Ed25519").
    pub crv: Option<String>,
    /// OKP public key (base64url encoded).
    pub x: Option<String>,
}

#[derive(Default)]
struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    default_key: Option<DecodingKey>,
    fetched_at: Option<Instant>,
    /// Last fetch attempt, successful or not.
    attempted_at: Option<Instant>,
}

impl CachedKeys {
    fn is_expired(&self) -> bool {
        self.fetched_at
            .map_or(true, |at| at.elapsed() >= JWKS_CACHE_DURATION)
    }

    fn may_refetch(&self) -> bool {
        self.attempted_at
            .map_or(true, |at| at.elapsed() >= JWKS_MIN_REFETCH_INTERVAL)
    }

    fn lookup(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None => self.default_key.clone(),
        }
    }
}

/// Keys fetched from the auth provider, refreshed hourly.
pub struct JwksCache {
    client: reqwest::Client,
    keys: RwLock<CachedKeys>,
}

impl Default for JwksCache {
    fn default() -> Self {
        Self::new()
    }
}

impl JwksCache {
    /// Create an empty cache; keys are fetched on first use.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            keys: RwLock::new(CachedKeys::default()),
        }
    }

    /// Get a decoding key from cache or fetch from the JWKS endpoint.
    ///
    /// A `kid` missing from a fresh cache also triggers a refetch, so key
    /// rotation is picked up without waiting for expiry, but at most once per
    /// [`JWKS_MIN_REFETCH_INTERVAL`].
    async fn decoding_key(
        &self,
        kid: Option<&str>,
        auth_base_url: &str,
    ) -> Result<DecodingKey, ApiError> {
        {
            let cached = self.keys.read().await;
            if !cached.is_expired() {
                if let Some(key) = cached.lookup(kid) {
                    return Ok(key);
                }
            }
        }

        {
            let mut cached = self.keys.write().await;
            // Another request may have refreshed the keys meanwhile.
            if !cached.is_expired() {
                if let Some(key) = cached.lookup(kid) {
                    return Ok(key);
                }
            }
            if !cached.may_refetch() {
                tracing::debug!(kid = ?kid, "Unknown JWT key id, JWKS refreshed recently");
                return Err(ApiError::Unauthorized);
            }
            cached.attempted_at = Some(Instant::now());
        }

        let jwks = self.fetch(auth_base_url).await?;

        let mut cached = self.keys.write().await;
        let now = Instant::now();
        *cached = CachedKeys {
            fetched_at: Some(now),
            attempted_at: Some(now),
            ..CachedKeys::default()
        };

        for jwk in &jwks.keys {
            if let Some(decoding_key) = jwk_to_decoding_key(jwk) {
                if let Some(ref key_kid) = jwk.kid {
                    cached.keys.insert(key_kid.clone(), decoding_key.clone());
                }
                if cached.default_key.is_none() {
                    cached.default_key = Some(decoding_key);
                }
            }
        }

        cached.lookup(kid).ok_or(ApiError::Unauthorized)
    }

    async fn fetch(&self, auth_base_url: &str) -> Result<Jwks, ApiError> {
        let jwks_url = format!(
            "{}/.well-known/jwks.json",
            auth_base_url.trim_end_matches('/')
        );

        tracing::debug!(url = %jwks_url, "Fetching JWKS");

        let response = self.client.get(&jwks_url).send().await.map_err(|e| {
            tracing::error!(error = %e, url = %jwks_url, "Failed to fetch JWKS");
            ApiError::Unauthorized
        })?;

        if !response.status().is_success() {
            tracing::error!(
                status = %response.status(),
                url = %jwks_url,
                "JWKS fetch returned non-success status"
            );
            return Err(ApiError::Unauthorized);
        }

        let jwks: Jwks = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse JWKS response");
            ApiError::Unauthorized
        })?;

        tracing::info!(keys_count = %jwks.keys.len(), "JWKS fetched successfully");

        Ok(jwks)
    }
}

/// Validate a session token.
///
/// HS256 with the shared secret when one is configured, otherwise RS256 or
/// `EdDSA` against the provider's JWKS.
async fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "Failed to decode JWT header");
        ApiError::Unauthorized
    })?;

    let (decoding_key, algorithm) = if let Some(secret) = &state.config.auth_jwt_secret {
        (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
    } else {
        if !matches!(header.alg, Algorithm::RS256 | Algorithm::EdDSA) {
            tracing::debug!(alg = ?header.alg, "Unsupported JWT algorithm");
            return Err(ApiError::Unauthorized);
        }
        let key = state
            .jwks
            .decoding_key(header.kid.as_deref(), &state.config.auth_base_url)
            .await?;
        (key, header.alg)
    };

    let mut validation = Validation::new(algorithm);
    match &state.config.auth_audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    Ok(token_data.claims)
}

/// Convert a JWK to a `DecodingKey`.
fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => DecodingKey::from_rsa_components(jwk.n.as_ref()?, jwk.e.as_ref()?).ok(),
        "OKP" if jwk.crv.as_deref() == Some("Ed25519") => {
            DecodingKey::from_ed_components(jwk.x.as_ref()?).ok()
        }
        other => {
            tracing::debug!(kty = %other, "Skipping unsupported JWK");
            None
        }
    }
}
