//! Client error types.

/// Errors that can occur when using the funmagic client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Missing or rejected credentials.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Server message.
        message: String,
    },

    /// Not enough available credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits that could be spent.
        available: i64,
        /// Credits the operation needed.
        required: i64,
    },

    /// Not enough reserved credits to confirm or release.
    #[error("insufficient reserved credits: reserved={reserved}, required={required}")]
    InsufficientReserved {
        /// Credits currently on hold.
        reserved: i64,
        /// Credits the operation needed.
        required: i64,
    },

    /// The operation was already applied.
    #[error("duplicate idempotency key: {key}")]
    DuplicateIdempotencyKey {
        /// The key, when the server reported it.
        key: String,
    },

    /// Too many requests.
    #[error("rate limited (retry after {retry_after_seconds:?}s)")]
    RateLimited {
        /// Value of the `Retry-After` header.
        retry_after_seconds: Option<u64>,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
