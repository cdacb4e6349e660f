//! Storage layer for the funmagic credits ledger.
//!
//! The [`Store`] trait is implemented by:
//!
//! - [`MemoryStore`]: everything behind one lock, used in tests and for
//!   ephemeral deployments.
//! - `RocksStore` (feature `rocksdb-backend`): column families written with
//!   atomic `WriteBatch`es.
//!
//! # Consistency
//!
//! [`Store::apply`] is the only way to change a balance. Implementations hold
//! a write lock from the moment the current row is read until the credit row,
//! the transaction and the idempotency index are all written, so concurrent
//! operations on the same user cannot interleave their read-modify-write.
//!
//! # Example
//!
//! ```
//! use funmagic_core::{LedgerOperation, UserId};
//! use funmagic_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//!
//! let entry = store
//!     .apply(&LedgerOperation::AdminAdjustment {
//!         user_id,
//!         amount: 500,
//!         description: "Launch promo".into(),
//!     })
//!     .unwrap();
//!
//! assert_eq!(entry.credit.balance, 500);
//! assert_eq!(store.get_credit(&user_id).unwrap().unwrap().balance, 500);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use funmagic_core::{
    Credit, CreditTransaction, LedgerEntry, LedgerOperation, RateLimitSettings, TransactionId,
    TransactionType, UserId,
};

/// Filter and page for transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionQuery {
    /// Only return transactions of this type.
    pub transaction_type: Option<TransactionType>,
    /// Page size.
    pub limit: usize,
    /// Matching transactions to skip, newest first.
    pub offset: usize,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            transaction_type: None,
            limit: 20,
            offset: 0,
        }
    }
}

impl TransactionQuery {
    fn matches(&self, transaction: &CreditTransaction) -> bool {
        self.transaction_type
            .map_or(true, |ty| transaction.transaction_type == ty)
    }
}

/// The storage trait defining all database operations.
pub trait Store: Send + Sync {
    // =========================================================================
    // Credits
    // =========================================================================

    /// Get a user's credit row, `None` if the user was never credited.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_credit(&self, user_id: &UserId) -> Result<Option<Credit>>;

    /// Apply a ledger operation atomically.
    ///
    /// Creates the credit row when it does not exist yet.
    ///
    /// # Errors
    ///
    /// - `StoreError::Ledger` if the operation is refused (insufficient
    ///   credits, duplicate idempotency key, invalid amount, ...). Nothing is
    ///   written in that case.
    /// - `StoreError::Database` / `StoreError::Serialization` on backend failure.
    fn apply(&self, operation: &LedgerOperation) -> Result<LedgerEntry>;

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// Get the transaction recorded under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_idempotency_key(&self, key: &str) -> Result<Option<CreditTransaction>>;

    /// List a user's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        user_id: &UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>>;

    /// Count a user's transactions, optionally of one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_transactions(
        &self,
        user_id: &UserId,
        transaction_type: Option<TransactionType>,
    ) -> Result<usize>;

    // =========================================================================
    // Settings
    // =========================================================================

    /// Get the rate-limit settings row, `None` if never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_rate_limit_settings(&self) -> Result<Option<RateLimitSettings>>;

    /// Replace the rate-limit settings row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_rate_limit_settings(&self, settings: &RateLimitSettings) -> Result<()>;
}
