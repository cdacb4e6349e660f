//! Error types for funmagic domain logic.

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Reasons a ledger operation is rejected.
///
/// A rejected operation never changes any state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The operation would take the spendable balance below zero.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Spendable credits before the operation.
        available: i64,
        /// Credits the operation needs.
        required: i64,
    },

    /// A charge or release exceeds what is on hold.
    #[error("insufficient reserved credits: reserved={reserved}, required={required}")]
    InsufficientReserved {
        /// Credits on hold before the operation.
        reserved: i64,
        /// Credits the operation needs from the hold.
        required: i64,
    },

    /// The amount is zero, has the wrong sign, or overflows.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A description was required but missing.
    #[error("description is required")]
    MissingDescription,

    /// A transaction with this idempotency key already exists.
    #[error("duplicate idempotency key: {key}")]
    DuplicateIdempotencyKey {
        /// The offending key.
        key: String,
    },

    /// A transaction type name was not recognised.
    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(String),
}
