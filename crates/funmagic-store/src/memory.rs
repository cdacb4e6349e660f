//! In-memory storage implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use funmagic_core::{
    Credit, CreditTransaction, LedgerEntry, LedgerError, LedgerOperation, RateLimitSettings,
    TransactionId, TransactionType, UserId,
};

use crate::error::{Result, StoreError};
use crate::{Store, TransactionQuery};

#[derive(Default)]
struct Tables {
    credits: HashMap<UserId, Credit>,
    transactions: HashMap<TransactionId, CreditTransaction>,
    /// Per-user transaction ids in insertion order (oldest first).
    transactions_by_user: HashMap<UserId, Vec<TransactionId>>,
    idempotency_keys: HashMap<String, TransactionId>,
    rate_limit_settings: Option<RateLimitSettings>,
}

/// Store that keeps every table in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get_credit(&self, user_id: &UserId) -> Result<Option<Credit>> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables.credits.get(user_id).cloned())
    }

    fn apply(&self, operation: &LedgerOperation) -> Result<LedgerEntry> {
        let mut tables = self.tables.write().map_err(|_| StoreError::poisoned())?;

        let key = operation.idempotency_key();
        if let Some(key) = &key {
            if tables.idempotency_keys.contains_key(key) {
                return Err(LedgerError::DuplicateIdempotencyKey { key: key.clone() }.into());
            }
        }

        let user_id = operation.user_id();
        let entry = operation.plan(tables.credits.get(&user_id), chrono::Utc::now())?;

        let tx_id = entry.transaction.id;
        tables.credits.insert(user_id, entry.credit.clone());
        tables.transactions.insert(tx_id, entry.transaction.clone());
        tables
            .transactions_by_user
            .entry(user_id)
            .or_default()
            .push(tx_id);
        if let Some(key) = key {
            tables.idempotency_keys.insert(key, tx_id);
        }

        Ok(entry)
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables.transactions.get(transaction_id).cloned())
    }

    fn find_transaction_by_idempotency_key(&self, key: &str) -> Result<Option<CreditTransaction>> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables
            .idempotency_keys
            .get(key)
            .and_then(|id| tables.transactions.get(id))
            .cloned())
    }

    fn list_transactions(
        &self,
        user_id: &UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        let Some(ids) = tables.transactions_by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| tables.transactions.get(id))
            .filter(|tx| query.matches(tx))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    fn count_transactions(
        &self,
        user_id: &UserId,
        transaction_type: Option<TransactionType>,
    ) -> Result<usize> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        let Some(ids) = tables.transactions_by_user.get(user_id) else {
            return Ok(0);
        };

        Ok(ids
            .iter()
            .filter_map(|id| tables.transactions.get(id))
            .filter(|tx| transaction_type.map_or(true, |ty| tx.transaction_type == ty))
            .count())
    }

    fn get_rate_limit_settings(&self) -> Result<Option<RateLimitSettings>> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables.rate_limit_settings.clone())
    }

    fn put_rate_limit_settings(&self, settings: &RateLimitSettings) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::poisoned())?;
        tables.rate_limit_settings = Some(settings.clone());
        Ok(())
    }
}
