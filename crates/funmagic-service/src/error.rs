//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use funmagic_core::{ConfigError, LedgerError, UploadError};
use funmagic_store::StoreError;

use crate::storage::StorageError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input.
    #[error("{0}")]
    Validation(String),

    /// The spendable balance is too low.
    #[error("Insufficient credits")]
    InsufficientCredits {
        /// Spendable credits.
        available: i64,
        /// Credits needed.
        required: i64,
    },

    /// Not enough credits are on hold.
    #[error("Insufficient reserved credits")]
    InsufficientReserved {
        /// Credits on hold.
        reserved: i64,
        /// Credits needed from the hold.
        required: i64,
    },

    /// The operation was already recorded.
    #[error("Operation already processed: {0}")]
    DuplicateIdempotencyKey(String),

    /// Too many requests in the current window.
    #[error("Too many requests")]
    RateLimited,

    /// Object storage is not configured.
    #[error("File storage is not configured")]
    StorageUnavailable,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    /// HTTP status and machine-readable code.
    #[must_use]
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::InsufficientCredits { .. } => (StatusCode::BAD_REQUEST, "credits_insufficient"),
            Self::InsufficientReserved { .. } => {
                (StatusCode::CONFLICT, "credits_reserved_insufficient")
            }
            Self::DuplicateIdempotencyKey(_) => (StatusCode::CONFLICT, "duplicate_idempotency_key"),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded"),
            Self::StorageUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = match &self {
            Self::Unauthorized => ("Authentication required".to_string(), None),
            Self::Forbidden(msg) | Self::NotFound(msg) | Self::Validation(msg) => {
                (msg.clone(), None)
            }
            Self::InsufficientCredits {
                available,
                required,
            } => (
                self.to_string(),
                Some(serde_json::json!({
                    "available": available,
                    "required": required
                })),
            ),
            Self::InsufficientReserved { reserved, required } => (
                self.to_string(),
                Some(serde_json::json!({
                    "reserved": reserved,
                    "required": required
                })),
            ),
            Self::DuplicateIdempotencyKey(key) => (
                self.to_string(),
                Some(serde_json::json!({ "idempotencyKey": key })),
            ),
            Self::RateLimited | Self::StorageUnavailable => (self.to_string(), None),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                ("An internal error occurred".to_string(), None)
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits {
                available,
                required,
            } => Self::InsufficientCredits {
                available,
                required,
            },
            LedgerError::InsufficientReserved { reserved, required } => {
                Self::InsufficientReserved { reserved, required }
            }
            LedgerError::DuplicateIdempotencyKey { key } => Self::DuplicateIdempotencyKey(key),
            LedgerError::InvalidAmount(_)
            | LedgerError::MissingDescription
            | LedgerError::UnknownTransactionType(_) => Self::Validation(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Ledger(ledger) => ledger.into(),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::Validation(err.to_string())
    }
}
