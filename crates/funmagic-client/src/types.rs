//! Request and response types for the funmagic client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use funmagic_core::{
    GrantKind, LimitCategory, RateLimitConfig, RateLimitLimitEntry, ReferenceKind, ResolvedTier,
    TaskId, TransactionType, UserId,
};

// ============================================================================
// Credits
// ============================================================================

/// A user's credit position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// Total credits held.
    pub balance: i64,
    /// Credits that can be spent now.
    pub available_balance: i64,
    /// Credits on hold for running tasks.
    pub reserved_balance: i64,
    /// Credits ever purchased.
    pub lifetime_purchased: i64,
    /// Credits ever charged.
    pub lifetime_used: i64,
    /// Credits ever refunded.
    pub lifetime_refunded: i64,
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction ID.
    pub id: String,
    /// Transaction type.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Signed amount.
    pub amount: i64,
    /// Balance snapshot after this transaction.
    pub balance_after: i64,
    /// Description.
    pub description: Option<String>,
    /// Kind of the causing entity.
    pub reference_type: Option<ReferenceKind>,
    /// ID of the causing entity.
    pub reference_id: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Paging metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    /// Matching transactions in total.
    pub total: usize,
    /// Page size used.
    pub limit: usize,
    /// Offset used.
    pub offset: usize,
}

/// One page of transaction history.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPage {
    /// Transactions, newest first.
    pub transactions: Vec<Transaction>,
    /// Paging metadata.
    pub pagination: Pagination,
}

/// Filters for [`crate::FunmagicClient::list_transactions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter {
    /// Only return this type.
    pub transaction_type: Option<TransactionType>,
    /// Page size (server default 20, max 100).
    pub limit: Option<usize>,
    /// Entries to skip.
    pub offset: Option<usize>,
}

impl TransactionFilter {
    pub(crate) fn to_query(self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(t) = self.transaction_type {
            query.push(("type", t.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            query.push(("offset", offset.to_string()));
        }
        query
    }
}

/// A ledger change: the new position and the transaction recording it.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerResult {
    /// Position after the change.
    pub credits: Balance,
    /// The recorded transaction.
    pub transaction: Transaction,
}

// ============================================================================
// Internal credits API
// ============================================================================

/// Grant request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    /// Recipient.
    pub user_id: UserId,
    /// Credits to add.
    pub amount: i64,
    /// Grant kind.
    pub kind: GrantKind,
    /// History text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replay protection, e.g. the payment id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Kind of the causing entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<ReferenceKind>,
    /// ID of the causing entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Extra context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Reserve or confirm request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreditsRequest {
    /// Task owner.
    pub user_id: UserId,
    /// Task.
    pub task_id: TaskId,
    /// Credits.
    pub amount: i64,
    /// History text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Release request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    /// Task owner.
    pub user_id: UserId,
    /// Task.
    pub task_id: TaskId,
    /// Credits to return.
    pub amount: i64,
    /// Why the task did not complete.
    pub reason: String,
}

// ============================================================================
// Admin
// ============================================================================

/// A user's credits as seen by an administrator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredits {
    /// The user.
    pub user_id: UserId,
    /// Credit row, `None` if the user was never credited.
    pub credits: Option<Balance>,
    /// Most recent transactions, newest first.
    pub recent_transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdjustCreditsRequest<'a> {
    pub amount: i64,
    pub description: &'a str,
}

/// Result of an admin adjustment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentResult {
    /// The user.
    pub user_id: UserId,
    /// Position after the adjustment.
    pub credits: Balance,
    /// The recorded transaction.
    pub transaction: Transaction,
}

// ============================================================================
// Rate limits
// ============================================================================

/// The caller's tier and the limits it yields.
#[derive(Debug, Clone, Deserialize)]
pub struct MyRateLimits {
    /// Resolved tier.
    pub tier: ResolvedTier,
    /// Effective limit per category.
    pub limits: BTreeMap<LimitCategory, RateLimitLimitEntry>,
}

/// `{config}` envelope used by the settings endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfigBody {
    /// The configuration.
    pub config: RateLimitConfig,
}

// ============================================================================
// Uploads
// ============================================================================

/// A presigned upload handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    /// URL to `PUT` the file to.
    pub upload_url: String,
    /// Object key to reference the file by.
    pub storage_key: String,
    /// Bucket the object lands in.
    pub bucket: String,
}

/// A presigned download URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrl {
    /// URL to `GET` the object from.
    pub download_url: String,
    /// Seconds until the URL expires.
    pub expires_in: u64,
}

// ============================================================================
// Misc
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
}

/// Error response body. Older deployments sent `{"error": "message"}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ErrorField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ErrorField {
    Detailed(ApiErrorDetail),
    Legacy(String),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
