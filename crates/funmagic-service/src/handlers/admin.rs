//! Admin credit handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use funmagic_core::{LedgerOperation, UserId};
use funmagic_store::{Store, TransactionQuery};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::handlers::credits::{BalanceResponse, TransactionResponse};
use crate::state::AppState;

/// Transactions shown on the admin user view.
const RECENT_TRANSACTIONS: usize = 10;

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("invalid user id: {raw}")))
}

/// A user's credit position as seen by an administrator.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreditsResponse {
    /// The user.
    pub user_id: String,
    /// Credit row, `null` if the user was never credited.
    pub credits: Option<BalanceResponse>,
    /// Most recent transactions, newest first.
    pub recent_transactions: Vec<TransactionResponse>,
}

/// Get a user's credits and recent transactions.
pub async fn get_user_credits(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<UserCreditsResponse>, ApiError> {
    let user_id = parse_user_id(&id)?;

    let credit = state.store.get_credit(&user_id)?;
    let recent = state.store.list_transactions(
        &user_id,
        &TransactionQuery {
            transaction_type: None,
            limit: RECENT_TRANSACTIONS,
            offset: 0,
        },
    )?;

    Ok(Json(UserCreditsResponse {
        user_id: user_id.to_string(),
        credits: credit.as_ref().map(BalanceResponse::from),
        recent_transactions: recent.iter().map(TransactionResponse::from).collect(),
    }))
}

/// Admin adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    /// Signed amount: positive grants, negative debits.
    pub amount: i64,
    /// Reason shown in the user's history.
    pub description: String,
}

/// Admin adjustment response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCreditsResponse {
    /// The user.
    pub user_id: String,
    /// Position after the adjustment.
    pub credits: BalanceResponse,
    /// The recorded transaction.
    pub transaction: TransactionResponse,
}

/// Add or remove credits on a user's account.
pub async fn adjust_user_credits(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(body): Json<AdjustCreditsRequest>,
) -> Result<Json<AdjustCreditsResponse>, ApiError> {
    let user_id = parse_user_id(&id)?;

    let entry = state
        .store
        .apply(&LedgerOperation::AdminAdjustment {
            user_id,
            amount: body.amount,
            description: body.description,
        })
        .map_err(|e| {
            tracing::warn!(
                admin_id = %admin.user_id,
                user_id = %user_id,
                amount = %body.amount,
                error = %e,
                "Admin credit adjustment rejected"
            );
            e
        })?;

    if body.amount > 0 {
        state.rate_limiter.invalidate_user(&user_id).await;
    }

    tracing::info!(
        admin_id = %admin.user_id,
        user_id = %user_id,
        amount = %body.amount,
        new_balance = %entry.credit.balance,
        "Admin credit adjustment applied"
    );

    Ok(Json(AdjustCreditsResponse {
        user_id: user_id.to_string(),
        credits: BalanceResponse::from(&entry.credit),
        transaction: TransactionResponse::from(&entry.transaction),
    }))
}
