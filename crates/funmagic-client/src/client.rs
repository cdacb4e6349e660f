//! Funmagic HTTP client implementation.

use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

use funmagic_core::{RateLimitConfig, UploadRequest, UserId};

use crate::error::ClientError;
use crate::types::{
    AdjustCreditsRequest, AdjustmentResult, ApiErrorResponse, Balance, DownloadUrl, ErrorField,
    GrantRequest, HealthResponse, LedgerResult, MyRateLimits, PresignedUpload, RateLimitConfigBody,
    ReleaseRequest, TaskCreditsRequest, TransactionFilter, TransactionPage, UserCredits,
};

/// Funmagic API client.
///
/// Service calls (grants and the task lifecycle) authenticate with the API key
/// the client was built with. User and admin calls take the caller's session
/// token.
#[derive(Debug, Clone)]
pub struct FunmagicClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl FunmagicClient {
    /// Create a new funmagic client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the funmagic service (e.g., `"http://funmagic:8080"`)
    /// * `api_key` - Service API key for the internal credits API
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new funmagic client with custom options.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn service(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
    }

    // ========================================================================
    // Internal credits API (service API key)
    // ========================================================================

    /// Grant purchase, bonus, welcome or refund credits.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DuplicateIdempotencyKey`] if a grant with the same
    /// key was already applied.
    pub async fn grant_credits(&self, request: &GrantRequest) -> Result<LedgerResult, ClientError> {
        let builder = self
            .client
            .post(self.url("/v1/internal/credits/grant"))
            .json(request);
        self.send(self.service(builder)).await
    }

    /// Hold credits for a task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredits`] if the user cannot cover
    /// the amount.
    pub async fn reserve_credits(
        &self,
        request: &TaskCreditsRequest,
    ) -> Result<LedgerResult, ClientError> {
        let builder = self
            .client
            .post(self.url("/v1/internal/credits/reserve"))
            .json(request);
        self.send(self.service(builder)).await
    }

    /// Charge a task's hold once it completed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientReserved`] if less than `amount` is
    /// on hold.
    pub async fn confirm_credits(
        &self,
        request: &TaskCreditsRequest,
    ) -> Result<LedgerResult, ClientError> {
        let builder = self
            .client
            .post(self.url("/v1/internal/credits/confirm"))
            .json(request);
        self.send(self.service(builder)).await
    }

    /// Return a task's hold after it failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn release_credits(
        &self,
        request: &ReleaseRequest,
    ) -> Result<LedgerResult, ClientError> {
        let builder = self
            .client
            .post(self.url("/v1/internal/credits/release"))
            .json(request);
        self.send(self.service(builder)).await
    }

    // ========================================================================
    // User API (session token)
    // ========================================================================

    /// Get the caller's balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(&self, user_jwt: &str) -> Result<Balance, ClientError> {
        let builder = self
            .client
            .get(self.url("/v1/credits/balance"))
            .bearer_auth(user_jwt);
        self.send(builder).await
    }

    /// List the caller's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_transactions(
        &self,
        user_jwt: &str,
        filter: TransactionFilter,
    ) -> Result<TransactionPage, ClientError> {
        let builder = self
            .client
            .get(self.url("/v1/credits/transactions"))
            .query(&filter.to_query())
            .bearer_auth(user_jwt);
        self.send(builder).await
    }

    /// Get the caller's rate-limit tier and effective limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_my_rate_limits(&self, user_jwt: &str) -> Result<MyRateLimits, ClientError> {
        let builder = self
            .client
            .get(self.url("/v1/rate-limit/me"))
            .bearer_auth(user_jwt);
        self.send(builder).await
    }

    /// Request a presigned upload URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] with code `validation_error` if the upload
    /// is not allowed, or `storage_unavailable` if storage is not configured.
    pub async fn presign_upload(
        &self,
        user_jwt: &str,
        request: &UploadRequest,
    ) -> Result<PresignedUpload, ClientError> {
        let builder = self
            .client
            .post(self.url("/v1/upload/presign"))
            .bearer_auth(user_jwt)
            .json(request);
        self.send(builder).await
    }

    /// Request a presigned download URL for one of the caller's private objects.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] with code `forbidden` if the key is not under
    /// the caller's own prefix.
    pub async fn get_download_url(
        &self,
        user_jwt: &str,
        storage_key: &str,
    ) -> Result<DownloadUrl, ClientError> {
        let builder = self
            .client
            .get(self.url("/v1/upload/download-url"))
            .bearer_auth(user_jwt)
            .query(&[("storageKey", storage_key)]);
        self.send(builder).await
    }

    // ========================================================================
    // Admin API (admin session token)
    // ========================================================================

    /// Get a user's credits and recent transactions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_user_credits(
        &self,
        admin_jwt: &str,
        user_id: &UserId,
    ) -> Result<UserCredits, ClientError> {
        let builder = self
            .client
            .get(self.url(&format!("/v1/admin/users/{user_id}/credits")))
            .bearer_auth(admin_jwt);
        self.send(builder).await
    }

    /// Add (positive `amount`) or remove (negative) credits.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InsufficientCredits`] if a debit would take the
    /// balance below zero.
    pub async fn adjust_user_credits(
        &self,
        admin_jwt: &str,
        user_id: &UserId,
        amount: i64,
        description: &str,
    ) -> Result<AdjustmentResult, ClientError> {
        let builder = self
            .client
            .post(self.url(&format!("/v1/admin/users/{user_id}/credits")))
            .bearer_auth(admin_jwt)
            .json(&AdjustCreditsRequest {
                amount,
                description,
            });
        self.send(builder).await
    }

    /// Get the active rate-limit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_rate_limit_settings(
        &self,
        admin_jwt: &str,
    ) -> Result<RateLimitConfig, ClientError> {
        let builder = self
            .client
            .get(self.url("/v1/admin/settings/rate-limit"))
            .bearer_auth(admin_jwt);
        let body: RateLimitConfigBody = self.send(builder).await?;
        Ok(body.config)
    }

    /// Replace the rate-limit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] with code `validation_error` if the
    /// configuration is rejected.
    pub async fn update_rate_limit_settings(
        &self,
        admin_jwt: &str,
        config: RateLimitConfig,
    ) -> Result<RateLimitConfig, ClientError> {
        let builder = self
            .client
            .put(self.url("/v1/admin/settings/rate-limit"))
            .bearer_auth(admin_jwt)
            .json(&RateLimitConfigBody { config });
        let body: RateLimitConfigBody = self.send(builder).await?;
        Ok(body.config)
    }

    /// Check service health.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.send(self.client.get(self.url("/health"))).await
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = builder.send().await?;
        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_seconds = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ClientError::RateLimited {
                retry_after_seconds,
            });
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        let detail = match error_body {
            Ok(ApiErrorResponse {
                error: ErrorField::Detailed(detail),
            }) => detail,
            Ok(ApiErrorResponse {
                error: ErrorField::Legacy(message),
            }) => {
                return Err(if status == StatusCode::UNAUTHORIZED {
                    ClientError::Unauthorized { message }
                } else {
                    ClientError::Api {
                        code: "unknown".to_string(),
                        message,
                        status: status.as_u16(),
                    }
                });
            }
            Err(_) => {
                return Err(ClientError::Api {
                    code: "unknown".to_string(),
                    message: format!("HTTP {status}"),
                    status: status.as_u16(),
                });
            }
        };

        tracing::debug!(status = %status, code = %detail.code, "Funmagic API error");

        let detail_i64 = |key: &str| {
            detail
                .details
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0)
        };

        // Map specific error codes to typed errors
        let code = detail.code.as_str();
        Err(match code {
            "unauthorized" => ClientError::Unauthorized {
                message: detail.message,
            },
            "credits_insufficient" => ClientError::InsufficientCredits {
                available: detail_i64("available"),
                required: detail_i64("required"),
            },
            "credits_reserved_insufficient" => ClientError::InsufficientReserved {
                reserved: detail_i64("reserved"),
                required: detail_i64("required"),
            },
            "duplicate_idempotency_key" => ClientError::DuplicateIdempotencyKey {
                key: detail
                    .details
                    .as_ref()
                    .and_then(|d| d.get("idempotencyKey"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => ClientError::Api {
                code: code.to_string(),
                message: detail.message,
                status: status.as_u16(),
            },
        })
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = FunmagicClient::new("http://localhost:8080/", "test-api-key").unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.url("/health"), "http://localhost:8080/health");
    }

    #[test]
    fn client_options() {
        let options = ClientOptions::with_service_name("task-runner");
        let client =
            FunmagicClient::with_options("http://localhost:8080", "key", options).unwrap();
        assert_eq!(client.service_name, "task-runner");
    }
}
