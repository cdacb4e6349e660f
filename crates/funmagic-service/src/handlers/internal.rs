//! Service-to-service credit handlers.
//!
//! Called by the task runner (reserve, confirm, release) and by payment
//! processing (grant). Task operations are keyed by task id, so a retried
//! call fails with `duplicate_idempotency_key` instead of moving credits twice.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use funmagic_core::{
    CreditGrant, GrantKind, LedgerOperation, Reference, ReferenceKind, TaskId, UserId,
};
use funmagic_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::credits::LedgerResponse;
use crate::state::AppState;

/// Grant request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    /// Recipient.
    pub user_id: UserId,
    /// Credits to add.
    pub amount: i64,
    /// Grant kind.
    pub kind: GrantKind,
    /// History text.
    #[serde(default)]
    pub description: Option<String>,
    /// Replay protection, e.g. the payment id.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Kind of the causing entity.
    #[serde(default)]
    pub reference_type: Option<ReferenceKind>,
    /// ID of the causing entity.
    #[serde(default)]
    pub reference_id: Option<uuid::Uuid>,
    /// Extra context.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Reserve or confirm request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreditsRequest {
    /// Task owner.
    pub user_id: UserId,
    /// Task.
    pub task_id: TaskId,
    /// Credits.
    pub amount: i64,
    /// History text.
    #[serde(default)]
    pub description: Option<String>,
}

/// Release request.
#[derive(Debug, Deserialize)]
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

async fn apply(
    state: &AppState,
    service: &ServiceAuth,
    operation: &LedgerOperation,
) -> Result<Json<LedgerResponse>, ApiError> {
    let user_id = operation.user_id();

    let entry = match state.store.apply(operation) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(
                service = %service.service_name,
                user_id = %user_id,
                error = %e,
                "Ledger operation rejected"
            );
            return Err(e.into());
        }
    };

    tracing::info!(
        service = %service.service_name,
        user_id = %user_id,
        transaction_type = %entry.transaction.transaction_type,
        amount = %entry.transaction.amount,
        balance = %entry.credit.balance,
        reserved = %entry.credit.reserved_balance,
        "Ledger operation applied"
    );

    Ok(Json(LedgerResponse::from(&entry)))
}

/// Grant purchase, bonus, welcome or refund credits.
pub async fn grant(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<GrantRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let reference = body.reference_type.map(|kind| Reference {
        kind,
        id: body.reference_id,
    });
    let user_id = body.user_id;
    let kind = body.kind;

    let response = apply(
        &state,
        &service,
        &LedgerOperation::Grant(CreditGrant {
            user_id,
            amount: body.amount,
            kind,
            description: body.description,
            reference,
            idempotency_key: body.idempotency_key,
            metadata: body.metadata,
        }),
    )
    .await?;

    if kind == GrantKind::Purchase {
        state.rate_limiter.invalidate_user(&user_id).await;
    }

    Ok(response)
}

/// Hold credits for a task.
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<TaskCreditsRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    apply(
        &state,
        &service,
        &LedgerOperation::Reserve {
            user_id: body.user_id,
            amount: body.amount,
            task_id: body.task_id,
            description: body.description,
        },
    )
    .await
}

/// Charge a task's hold.
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<TaskCreditsRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    apply(
        &state,
        &service,
        &LedgerOperation::Confirm {
            user_id: body.user_id,
            amount: body.amount,
            task_id: body.task_id,
            description: body.description,
        },
    )
    .await
}

/// Return a task's hold.
pub async fn release(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<ReleaseRequest>,
) -> Result<Json<LedgerResponse>, ApiError> {
    apply(
        &state,
        &service,
        &LedgerOperation::Release {
            user_id: body.user_id,
            amount: body.amount,
            task_id: body.task_id,
            reason: body.reason,
        },
    )
    .await
}
