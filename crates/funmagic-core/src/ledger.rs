//! Ledger operations.
//!
//! A [`LedgerOperation`] is planned against the current [`Credit`] row and
//! yields a [`LedgerEntry`]: the row as it must look afterwards and the one
//! transaction that records the change. Planning is pure; stores persist the
//! entry atomically and serialize operations per user, so the checks made
//! here still hold at write time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credits::{Credit, CreditTransaction, Reference, TransactionType};
use crate::error::{LedgerError, Result};
use crate::{TaskId, TransactionId, UserId};

/// Credit kinds that can be granted through [`LedgerOperation::Grant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Paid purchase, counts toward `lifetime_purchased`.
    Purchase,
    /// Promotional credits.
    Bonus,
    /// Sign-up grant.
    Welcome,
    /// Refund, counts toward `lifetime_refunded`.
    Refund,
}

impl GrantKind {
    /// The transaction type recorded for this grant.
    #[must_use]
    pub const fn transaction_type(self) -> TransactionType {
        match self {
            Self::Purchase => TransactionType::Purchase,
            Self::Bonus => TransactionType::Bonus,
            Self::Welcome => TransactionType::Welcome,
            Self::Refund => TransactionType::Refund,
        }
    }
}

/// Parameters of a credit grant.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditGrant {
    /// Recipient.
    pub user_id: UserId,
    /// Credits to add, must be positive.
    pub amount: i64,
    /// What kind of grant this is.
    pub kind: GrantKind,
    /// History text.
    pub description: Option<String>,
    /// Causing entity.
    pub reference: Option<Reference>,
    /// Replay protection for external events such as payment webhooks.
    pub idempotency_key: Option<String>,
    /// Extra context.
    pub metadata: serde_json::Value,
}

/// Every way the ledger can change.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOperation {
    /// Administrator adds (positive) or removes (negative) credits.
    AdminAdjustment {
        /// Target user.
        user_id: UserId,
        /// Signed, non-zero amount.
        amount: i64,
        /// Reason shown in the history, required.
        description: String,
    },

    /// Purchase, bonus, welcome or refund credits.
    Grant(CreditGrant),

    /// Hold credits for a task.
    Reserve {
        /// Task owner.
        user_id: UserId,
        /// Credits to hold.
        amount: i64,
        /// Task the hold is for.
        task_id: TaskId,
        /// Overrides the default history text.
        description: Option<String>,
    },

    /// Turn a hold into a charge once the task succeeded.
    Confirm {
        /// Task owner.
        user_id: UserId,
        /// Credits to charge.
        amount: i64,
        /// Task being charged.
        task_id: TaskId,
        /// Overrides the default history text.
        description: Option<String>,
    },

    /// Return a hold after the task failed or was cancelled.
    Release {
        /// Task owner.
        user_id: UserId,
        /// Credits to return.
        amount: i64,
        /// Task whose hold is returned.
        task_id: TaskId,
        /// Why the hold is returned.
        reason: String,
    },
}

/// The outcome of a successful operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The credit row after the change.
    pub credit: Credit,
    /// The transaction recording the change.
    pub transaction: CreditTransaction,
}

impl LedgerOperation {
    /// The user whose row this operation touches.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::AdminAdjustment { user_id, .. }
            | Self::Reserve { user_id, .. }
            | Self::Confirm { user_id, .. }
            | Self::Release { user_id, .. } => *user_id,
            Self::Grant(grant) => grant.user_id,
        }
    }

    /// The idempotency key the resulting transaction will carry.
    ///
    /// Task operations derive theirs from the task id, so each task can be
    /// reserved, charged and released at most once.
    #[must_use]
    pub fn idempotency_key(&self) -> Option<String> {
        match self {
            Self::AdminAdjustment { .. } => None,
            Self::Grant(grant) => grant.idempotency_key.clone(),
            Self::Reserve { task_id, .. } => Some(format!("reserve-{task_id}")),
            Self::Confirm { task_id, .. } => Some(format!("usage-{task_id}")),
            Self::Release { task_id, .. } => Some(format!("release-{task_id}")),
        }
    }

    /// Plan the operation against the current row (`None` if the user has
    /// never been credited).
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] describing the violated precondition. The
    /// idempotency key is not checked here; that needs the store.
    pub fn plan(&self, current: Option<&Credit>, now: DateTime<Utc>) -> Result<LedgerEntry> {
        let mut credit = current
            .cloned()
            .unwrap_or_else(|| Credit::empty(self.user_id()));

        let (transaction_type, amount, balance_after, description, reference, metadata) =
            match self {
                Self::AdminAdjustment {
                    amount,
                    description,
                    ..
                } => {
                    if *amount == 0 {
                        return Err(LedgerError::InvalidAmount(
                            "adjustment must not be zero".into(),
                        ));
                    }
                    if description.trim().is_empty() {
                        return Err(LedgerError::MissingDescription);
                    }
                    let new_balance = checked(credit.balance.checked_add(*amount))?;
                    if new_balance < 0 {
                        return Err(LedgerError::InsufficientCredits {
                            available: credit.balance,
                            required: checked(amount.checked_neg())?,
                        });
                    }
                    credit.balance = new_balance;
                    let transaction_type = if *amount > 0 {
                        credit.lifetime_purchased =
                            checked(credit.lifetime_purchased.checked_add(*amount))?;
                        TransactionType::Bonus
                    } else {
                        TransactionType::AdminDebit
                    };
                    (
                        transaction_type,
                        *amount,
                        new_balance,
                        Some(description.clone()),
                        Some(Reference::admin()),
                        serde_json::Value::Null,
                    )
                }

                Self::Grant(grant) => {
                    require_positive(grant.amount)?;
                    credit.balance = checked(credit.balance.checked_add(grant.amount))?;
                    match grant.kind {
                        GrantKind::Purchase => {
                            credit.lifetime_purchased =
                                checked(credit.lifetime_purchased.checked_add(grant.amount))?;
                        }
                        GrantKind::Refund => {
                            credit.lifetime_refunded =
                                checked(credit.lifetime_refunded.checked_add(grant.amount))?;
                        }
                        GrantKind::Bonus | GrantKind::Welcome => {}
                    }
                    (
                        grant.kind.transaction_type(),
                        grant.amount,
                        credit.balance,
                        grant.description.clone(),
                        grant.reference.clone(),
                        grant.metadata.clone(),
                    )
                }

                Self::Reserve {
                    amount,
                    task_id,
                    description,
                    ..
                } => {
                    require_positive(*amount)?;
                    let available = credit.available_balance();
                    if available < *amount {
                        return Err(LedgerError::InsufficientCredits {
                            available,
                            required: *amount,
                        });
                    }
                    credit.reserved_balance += amount;
                    (
                        TransactionType::Reservation,
                        -amount,
                        credit.available_balance(),
                        Some(
                            description
                                .clone()
                                .unwrap_or_else(|| format!("Reserved for task {task_id}")),
                        ),
                        Some(Reference::task(*task_id)),
                        serde_json::Value::Null,
                    )
                }

                Self::Confirm {
                    amount,
                    task_id,
                    description,
                    ..
                } => {
                    require_positive(*amount)?;
                    if credit.reserved_balance < *amount {
                        return Err(LedgerError::InsufficientReserved {
                            reserved: credit.reserved_balance,
                            required: *amount,
                        });
                    }
                    if credit.balance < *amount {
                        return Err(LedgerError::InsufficientCredits {
                            available: credit.balance,
                            required: *amount,
                        });
                    }
                    credit.balance -= amount;
                    credit.reserved_balance -= amount;
                    credit.lifetime_used = checked(credit.lifetime_used.checked_add(*amount))?;
                    (
                        TransactionType::Usage,
                        -amount,
                        credit.balance,
                        Some(
                            description
                                .clone()
                                .unwrap_or_else(|| format!("Used for task {task_id}")),
                        ),
                        Some(Reference::task(*task_id)),
                        serde_json::Value::Null,
                    )
                }

                Self::Release {
                    amount,
                    task_id,
                    reason,
                    ..
                } => {
                    require_positive(*amount)?;
                    if credit.reserved_balance < *amount {
                        return Err(LedgerError::InsufficientReserved {
                            reserved: credit.reserved_balance,
                            required: *amount,
                        });
                    }
                    credit.reserved_balance -= amount;
                    (
                        TransactionType::Release,
                        *amount,
                        credit.available_balance(),
                        Some(reason.clone()),
                        Some(Reference::task(*task_id)),
                        serde_json::Value::Null,
                    )
                }
            };

        credit.updated_at = now;

        let transaction = CreditTransaction {
            id: TransactionId::generate(),
            user_id: credit.user_id,
            transaction_type,
            amount,
            balance_after,
            description,
            reference,
            metadata,
            idempotency_key: self.idempotency_key(),
            created_at: now,
        };

        Ok(LedgerEntry {
            credit,
            transaction,
        })
    }
}

fn require_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

fn checked(value: Option<i64>) -> Result<i64> {
    value.ok_or_else(|| LedgerError::InvalidAmount("amount overflows the balance".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit_with(balance: i64, reserved: i64) -> Credit {
        let mut credit = Credit::empty(UserId::generate());
        credit.balance = balance;
        credit.reserved_balance = reserved;
        credit
    }

    fn adjust(user_id: UserId, amount: i64) -> LedgerOperation {
        LedgerOperation::AdminAdjustment {
            user_id,
            amount,
            description: "support ticket".into(),
        }
    }

    #[test]
    fn admin_credit_on_missing_row_creates_it() {
        let user_id = UserId::generate();
        let entry = adjust(user_id, 500).plan(None, Utc::now()).unwrap();

        assert_eq!(entry.credit.user_id, user_id);
        assert_eq!(entry.credit.balance, 500);
        assert_eq!(entry.credit.lifetime_purchased, 500);
        assert_eq!(entry.transaction.transaction_type, TransactionType::Bonus);
        assert_eq!(entry.transaction.balance_after, 500);
        assert_eq!(entry.transaction.reference, Some(Reference::admin()));
        assert!(entry.transaction.idempotency_key.is_none());
    }

    #[test]
    fn admin_debit_keeps_lifetime_purchased() {
        let mut credit = credit_with(300, 0);
        credit.lifetime_purchased = 300;
        let entry = adjust(credit.user_id, -120).plan(Some(&credit), Utc::now()).unwrap();

        assert_eq!(entry.credit.balance, 180);
        assert_eq!(entry.credit.lifetime_purchased, 300);
        assert_eq!(entry.transaction.transaction_type, TransactionType::AdminDebit);
        assert_eq!(entry.transaction.amount, -120);
        assert_eq!(entry.transaction.balance_after, 180);
    }

    #[test]
    fn admin_debit_below_zero_is_rejected() {
        let credit = credit_with(50, 0);
        let err = adjust(credit.user_id, -51).plan(Some(&credit), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientCredits {
                available: 50,
                required: 51
            }
        );
    }

    #[test]
    fn admin_debit_to_exactly_zero_is_allowed() {
        let credit = credit_with(50, 0);
        let entry = adjust(credit.user_id, -50).plan(Some(&credit), Utc::now()).unwrap();
        assert_eq!(entry.credit.balance, 0);
    }

    #[test]
    fn admin_adjustment_requires_amount_and_description() {
        let user_id = UserId::generate();
        assert!(matches!(
            adjust(user_id, 0).plan(None, Utc::now()),
            Err(LedgerError::InvalidAmount(_))
        ));

        let blank = LedgerOperation::AdminAdjustment {
            user_id,
            amount: 10,
            description: "   ".into(),
        };
        assert_eq!(
            blank.plan(None, Utc::now()).unwrap_err(),
            LedgerError::MissingDescription
        );
    }

    #[test]
    fn most_negative_adjustment_is_rejected() {
        let credit = credit_with(100, 0);
        assert!(matches!(
            adjust(credit.user_id, i64::MIN).plan(Some(&credit), Utc::now()),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            adjust(credit.user_id, i64::MIN).plan(None, Utc::now()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn adjustment_overflow_is_rejected() {
        let credit = credit_with(i64::MAX, 0);
        assert!(matches!(
            adjust(credit.user_id, 1).plan(Some(&credit), Utc::now()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn grants_track_lifetime_counters_by_kind() {
        let user_id = UserId::generate();
        let grant = |kind, amount| {
            LedgerOperation::Grant(CreditGrant {
                user_id,
                amount,
                kind,
                description: None,
                reference: None,
                idempotency_key: None,
                metadata: serde_json::Value::Null,
            })
        };

        let now = Utc::now();
        let after_purchase = grant(GrantKind::Purchase, 100).plan(None, now).unwrap().credit;
        let after_refund = grant(GrantKind::Refund, 40)
            .plan(Some(&after_purchase), now)
            .unwrap()
            .credit;
        let after_welcome = grant(GrantKind::Welcome, 10)
            .plan(Some(&after_refund), now)
            .unwrap();

        assert_eq!(after_welcome.credit.balance, 150);
        assert_eq!(after_welcome.credit.lifetime_purchased, 100);
        assert_eq!(after_welcome.credit.lifetime_refunded, 40);
        assert_eq!(after_welcome.transaction.transaction_type, TransactionType::Welcome);
        assert!(grant(GrantKind::Bonus, -5).plan(None, now).is_err());
    }

    #[test]
    fn reserve_confirm_moves_credits_from_hold_to_used() {
        let credit = credit_with(100, 0);
        let task_id = TaskId::generate();
        let now = Utc::now();

        let reserved = LedgerOperation::Reserve {
            user_id: credit.user_id,
            amount: 30,
            task_id,
            description: None,
        }
        .plan(Some(&credit), now)
        .unwrap();
        assert_eq!(reserved.credit.balance, 100);
        assert_eq!(reserved.credit.reserved_balance, 30);
        assert_eq!(reserved.transaction.amount, -30);
        assert_eq!(reserved.transaction.balance_after, 70);
        assert_eq!(
            reserved.transaction.idempotency_key,
            Some(format!("reserve-{task_id}"))
        );

        let charged = LedgerOperation::Confirm {
            user_id: credit.user_id,
            amount: 30,
            task_id,
            description: None,
        }
        .plan(Some(&reserved.credit), now)
        .unwrap();
        assert_eq!(charged.credit.balance, 70);
        assert_eq!(charged.credit.reserved_balance, 0);
        assert_eq!(charged.credit.lifetime_used, 30);
        assert_eq!(charged.transaction.transaction_type, TransactionType::Usage);
        assert_eq!(charged.transaction.balance_after, 70);
        assert_eq!(
            charged.transaction.idempotency_key,
            Some(format!("usage-{task_id}"))
        );
    }

    #[test]
    fn reserve_checks_available_not_total_balance() {
        let credit = credit_with(100, 80);
        let err = LedgerOperation::Reserve {
            user_id: credit.user_id,
            amount: 21,
            task_id: TaskId::generate(),
            description: None,
        }
        .plan(Some(&credit), Utc::now())
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientCredits {
                available: 20,
                required: 21
            }
        );
    }

    #[test]
    fn release_returns_hold_without_touching_balance() {
        let credit = credit_with(100, 30);
        let entry = LedgerOperation::Release {
            user_id: credit.user_id,
            amount: 30,
            task_id: TaskId::generate(),
            reason: "provider timeout".into(),
        }
        .plan(Some(&credit), Utc::now())
        .unwrap();

        assert_eq!(entry.credit.balance, 100);
        assert_eq!(entry.credit.reserved_balance, 0);
        assert_eq!(entry.transaction.amount, 30);
        assert_eq!(entry.transaction.balance_after, 100);
        assert_eq!(entry.transaction.description.as_deref(), Some("provider timeout"));
    }

    #[test]
    fn release_more_than_reserved_is_rejected() {
        let credit = credit_with(100, 10);
        let err = LedgerOperation::Release {
            user_id: credit.user_id,
            amount: 11,
            task_id: TaskId::generate(),
            reason: "cancelled".into(),
        }
        .plan(Some(&credit), Utc::now())
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientReserved {
                reserved: 10,
                required: 11
            }
        );
    }
}
