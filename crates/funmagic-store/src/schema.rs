//! Column families of the `RocksDB` backend.

/// Column family names.
pub mod cf {
    /// Credit rows, keyed by `user_id`.
    pub const CREDITS: &str = "credits";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Idempotency keys, value is the `transaction_id` they produced.
    pub const IDEMPOTENCY_KEYS: &str = "idempotency_keys";

    /// Singleton settings rows, keyed by setting name.
    pub const SETTINGS: &str = "settings";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::CREDITS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::IDEMPOTENCY_KEYS,
        cf::SETTINGS,
    ]
}
