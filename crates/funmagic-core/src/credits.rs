//! Credit balances and the transaction log.
//!
//! Every change to a [`Credit`] row is paired with exactly one
//! [`CreditTransaction`]; the pairing itself lives in [`crate::ledger`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// The credit position of one user.
///
/// `balance` is what the user owns. `reserved_balance` is the part of it
/// held for in-flight tasks and not yet charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    /// Owner of the balance.
    pub user_id: UserId,

    /// Current balance in credits.
    pub balance: i64,

    /// Credits earmarked for tasks that have not finished yet.
    pub reserved_balance: i64,

    /// Sum of purchased (and admin-granted) credits, never decreases.
    pub lifetime_purchased: i64,

    /// Sum of charged usage, never decreases.
    pub lifetime_used: i64,

    /// Sum of refunds, never decreases.
    pub lifetime_refunded: i64,

    /// When the row was first written.
    pub created_at: DateTime<Utc>,

    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Credit {
    /// An empty position. Used for users that have never been credited.
    #[must_use]
    pub fn empty(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            reserved_balance: 0,
            lifetime_purchased: 0,
            lifetime_used: 0,
            lifetime_refunded: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance that can still be reserved or spent.
    #[must_use]
    pub const fn available_balance(&self) -> i64 {
        self.balance - self.reserved_balance
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Time-ordered identifier.
    pub id: TransactionId,

    /// The user whose position changed.
    pub user_id: UserId,

    /// What kind of event this was.
    pub transaction_type: TransactionType,

    /// Signed amount: positive adds credits, negative removes or holds them.
    pub amount: i64,

    /// Snapshot taken right after the change. For reservations and releases
    /// this is the available balance, for everything else the balance.
    pub balance_after: i64,

    /// Free-form text shown in histories.
    pub description: Option<String>,

    /// The entity that caused the change.
    pub reference: Option<Reference>,

    /// Extra context, `null` when there is none.
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// Unique key that makes replays of the same external event fail.
    pub idempotency_key: Option<String>,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Paid credit purchase.
    Purchase,
    /// Promotional credits, also used for positive admin adjustments.
    Bonus,
    /// Sign-up grant.
    Welcome,
    /// A confirmed task charge.
    Usage,
    /// Money returned to the user as credits.
    Refund,
    /// Credits put on hold for a task.
    Reservation,
    /// A hold returned after a task failed or was cancelled.
    Release,
    /// Credits removed by an administrator.
    AdminDebit,
    /// Credits that lapsed.
    Expiry,
}

impl TransactionType {
    /// The wire name, e.g. `admin_debit`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Bonus => "bonus",
            Self::Welcome => "welcome",
            Self::Usage => "usage",
            Self::Refund => "refund",
            Self::Reservation => "reservation",
            Self::Release => "release",
            Self::AdminDebit => "admin_debit",
            Self::Expiry => "expiry",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = crate::LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "purchase" => Self::Purchase,
            "bonus" => Self::Bonus,
            "welcome" => Self::Welcome,
            "usage" => Self::Usage,
            "refund" => Self::Refund,
            "reservation" => Self::Reservation,
            "release" => Self::Release,
            "admin_debit" => Self::AdminDebit,
            "expiry" => Self::Expiry,
            other => return Err(crate::LedgerError::UnknownTransactionType(other.to_string())),
        })
    }
}

/// Pointer from a ledger entry to the entity that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Entity kind.
    pub kind: ReferenceKind,
    /// Entity id, when the entity has one.
    pub id: Option<uuid::Uuid>,
}

impl Reference {
    /// Reference to a generation task.
    #[must_use]
    pub const fn task(task_id: crate::TaskId) -> Self {
        Self {
            kind: ReferenceKind::Task,
            id: Some(*task_id.as_uuid()),
        }
    }

    /// Reference to an administrator action.
    #[must_use]
    pub const fn admin() -> Self {
        Self {
            kind: ReferenceKind::Admin,
            id: None,
        }
    }
}

/// Kinds of entities a ledger entry can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A generation task.
    Task,
    /// A payment.
    Payment,
    /// An administrator action.
    Admin,
    /// The platform itself (welcome grants, expiry).
    System,
}

impl ReferenceKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Payment => "payment",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}
