//! Key encoding for the `RocksDB` column families.

use funmagic_core::{TransactionId, UserId};

/// Settings row holding the rate-limit configuration.
pub const RATE_LIMIT_SETTINGS: &[u8] = b"rate_limit";

/// Credit row key.
#[must_use]
pub fn credit_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Transaction key.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// User-transaction index key: `user_id (16 bytes) || transaction_id (16 bytes)`.
///
/// ULIDs sort by time, so a prefix scan yields a user's transactions oldest first.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Prefix covering all index keys of one user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Transaction ID encoded in a user-transaction index key, `None` if the key
/// is malformed.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Idempotency key.
#[must_use]
pub fn idempotency_key(key: &str) -> Vec<u8> {
    key.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_transaction_key_format() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert!(key.starts_with(&user_transactions_prefix(&user_id)));
        assert_eq!(&key[16..], tx_id.to_bytes());
    }

    #[test]
    fn extract_transaction_id_roundtrip() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(extract_transaction_id_from_user_key(&key), Some(tx_id));
    }

    #[test]
    fn extract_rejects_short_keys() {
        assert_eq!(extract_transaction_id_from_user_key(&[0u8; 20]), None);
    }
}
