//! Error types for funmagic storage.

use funmagic_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The ledger refused the operation; nothing was written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        Self::Database("ledger lock poisoned".into())
    }
}
