//! Credit balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use funmagic_core::{Credit, CreditTransaction, LedgerEntry, TransactionType};
use funmagic_store::{Store, TransactionQuery};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Largest page a client may request.
const MAX_PAGE_SIZE: usize = 100;

/// Balance response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
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

impl From<&Credit> for BalanceResponse {
    fn from(credit: &Credit) -> Self {
        Self {
            balance: credit.balance,
            available_balance: credit.available_balance(),
            reserved_balance: credit.reserved_balance,
            lifetime_purchased: credit.lifetime_purchased,
            lifetime_used: credit.lifetime_used,
            lifetime_refunded: credit.lifetime_refunded,
        }
    }
}

/// Transaction response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
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
    pub reference_type: Option<String>,
    /// ID of the causing entity.
    pub reference_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            reference_type: tx.reference.as_ref().map(|r| r.kind.as_str().to_string()),
            reference_id: tx
                .reference
                .as_ref()
                .and_then(|r| r.id)
                .map(|id| id.to_string()),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// A ledger change: the new position and the transaction recording it.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// Position after the change.
    pub credits: BalanceResponse,
    /// The recorded transaction.
    pub transaction: TransactionResponse,
}

impl From<&LedgerEntry> for LedgerResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            credits: BalanceResponse::from(&entry.credit),
            transaction: TransactionResponse::from(&entry.transaction),
        }
    }
}

/// Get current credit balance.
///
/// Users that were never credited read as all zeroes.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let credit = state
        .store
        .get_credit(&auth.user_id)?
        .unwrap_or_else(|| Credit::empty(auth.user_id));

    Ok(Json(BalanceResponse::from(&credit)))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Only return this transaction type.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// Maximum number of transactions to return (default: 20, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Paging metadata.
#[derive(Debug, Serialize)]
pub struct Pagination {
    /// Matching transactions in total.
    pub total: usize,
    /// Page size used.
    pub limit: usize,
    /// Offset used.
    pub offset: usize,
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Paging metadata.
    pub pagination: Pagination,
}

/// List transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let transaction_type = query
        .transaction_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::parse::<TransactionType>)
        .transpose()?;

    let limit = query.limit.min(MAX_PAGE_SIZE);
    let transactions = state.store.list_transactions(
        &auth.user_id,
        &TransactionQuery {
            transaction_type,
            limit,
            offset: query.offset,
        },
    )?;
    let total = state
        .store
        .count_transactions(&auth.user_id, transaction_type)?;

    Ok(Json(ListTransactionsResponse {
        transactions: transactions.iter().map(TransactionResponse::from).collect(),
        pagination: Pagination {
            total,
            limit,
            offset: query.offset,
        },
    }))
}
