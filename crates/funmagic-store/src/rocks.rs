//! `RocksDB` storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use funmagic_core::{
    Credit, CreditTransaction, LedgerEntry, LedgerError, LedgerOperation, RateLimitSettings,
    TransactionId, TransactionType, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{Store, TransactionQuery};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes ledger writes so a read-check-write cannot interleave.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_cbor<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// A user's transaction ids, newest first.
    fn user_transaction_ids(&self, user_id: &UserId) -> Result<Vec<TransactionId>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            match keys::extract_transaction_id_from_user_key(&key) {
                Some(id) => ids.push(id),
                None => tracing::warn!(len = key.len(), "Skipping malformed transaction index key"),
            }
        }

        ids.reverse();
        Ok(ids)
    }

    fn user_transactions(
        &self,
        user_id: &UserId,
        transaction_type: Option<TransactionType>,
    ) -> Result<impl Iterator<Item = Result<CreditTransaction>> + '_> {
        let ids = self.user_transaction_ids(user_id)?;
        Ok(ids.into_iter().filter_map(move |id| {
            match self.get_transaction(&id) {
                Ok(Some(tx)) => transaction_type
                    .map_or(true, |ty| tx.transaction_type == ty)
                    .then_some(Ok(tx)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Credits
    // =========================================================================

    fn get_credit(&self, user_id: &UserId) -> Result<Option<Credit>> {
        self.get_cbor(cf::CREDITS, &keys::credit_key(user_id))
    }

    fn apply(&self, operation: &LedgerOperation) -> Result<LedgerEntry> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::poisoned())?;

        let idempotency_key = operation.idempotency_key();
        if let Some(key) = &idempotency_key {
            let cf = self.cf(cf::IDEMPOTENCY_KEYS)?;
            let exists = self
                .db
                .get_cf(&cf, keys::idempotency_key(key))
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if exists {
                return Err(LedgerError::DuplicateIdempotencyKey { key: key.clone() }.into());
            }
        }

        let user_id = operation.user_id();
        let current = self.get_credit(&user_id)?;
        let entry = operation.plan(current.as_ref(), chrono::Utc::now())?;

        let cf_credits = self.cf(cf::CREDITS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let cf_idempotency = self.cf(cf::IDEMPOTENCY_KEYS)?;

        let tx_id = entry.transaction.id;
        let credit_value = Self::serialize(&entry.credit)?;
        let tx_value = Self::serialize(&entry.transaction)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_credits, keys::credit_key(&user_id), &credit_value);
        batch.put_cf(&cf_tx, keys::transaction_key(&tx_id), &tx_value);
        batch.put_cf(&cf_tx_by_user, keys::user_transaction_key(&user_id, &tx_id), []);
        if let Some(key) = &idempotency_key {
            batch.put_cf(&cf_idempotency, keys::idempotency_key(key), tx_id.to_bytes());
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(entry)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.get_cbor(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn find_transaction_by_idempotency_key(&self, key: &str) -> Result<Option<CreditTransaction>> {
        let cf = self.cf(cf::IDEMPOTENCY_KEYS)?;
        let Some(value) = self
            .db
            .get_cf(&cf, keys::idempotency_key(key))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes: [u8; 16] = value.as_slice().try_into().map_err(|_| {
            StoreError::Serialization(format!("idempotency entry for {key} is not a ULID"))
        })?;
        self.get_transaction(&TransactionId::from_bytes(bytes))
    }

    fn list_transactions(
        &self,
        user_id: &UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>> {
        self.user_transactions(user_id, query.transaction_type)?
            .skip(query.offset)
            .take(query.limit)
            .collect()
    }

    fn count_transactions(
        &self,
        user_id: &UserId,
        transaction_type: Option<TransactionType>,
    ) -> Result<usize> {
        if transaction_type.is_none() {
            return Ok(self.user_transaction_ids(user_id)?.len());
        }

        let mut count = 0;
        for tx in self.user_transactions(user_id, transaction_type)? {
            tx?;
            count += 1;
        }
        Ok(count)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    fn get_rate_limit_settings(&self) -> Result<Option<RateLimitSettings>> {
        self.get_cbor(cf::SETTINGS, keys::RATE_LIMIT_SETTINGS)
    }

    fn put_rate_limit_settings(&self, settings: &RateLimitSettings) -> Result<()> {
        let cf = self.cf(cf::SETTINGS)?;
        let value = Self::serialize(settings)?;

        self.db
            .put_cf(&cf, keys::RATE_LIMIT_SETTINGS, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funmagic_core::{RateLimitConfig, TaskId};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn adjust(user_id: UserId, amount: i64) -> LedgerOperation {
        LedgerOperation::AdminAdjustment {
            user_id,
            amount,
            description: format!("adjust {amount}"),
        }
    }

    #[test]
    fn apply_creates_credit_row() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        assert!(store.get_credit(&user_id).unwrap().is_none());

        let entry = store.apply(&adjust(user_id, 300)).unwrap();

        let credit = store.get_credit(&user_id).unwrap().unwrap();
        assert_eq!(credit, entry.credit);
        assert_eq!(credit.balance, 300);
        assert_eq!(credit.lifetime_purchased, 300);

        let tx = store.get_transaction(&entry.transaction.id).unwrap().unwrap();
        assert_eq!(tx.transaction_type, TransactionType::Bonus);
        assert_eq!(tx.balance_after, 300);
    }

    #[test]
    fn transactions_list_newest_first() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        for amount in [100, -40, 25] {
            store.apply(&adjust(user_id, amount)).unwrap();
        }

        let all = store
            .list_transactions(&user_id, &TransactionQuery::default())
            .unwrap();
        let amounts: Vec<_> = all.iter().map(|tx| tx.amount).collect();
        assert_eq!(amounts, vec![25, -40, 100]);

        let page = store
            .list_transactions(
                &user_id,
                &TransactionQuery {
                    transaction_type: None,
                    limit: 1,
                    offset: 1,
                },
            )
            .unwrap();
        assert_eq!(page[0].amount, -40);

        assert_eq!(store.count_transactions(&user_id, None).unwrap(), 3);
        assert_eq!(
            store
                .count_transactions(&user_id, Some(TransactionType::Bonus))
                .unwrap(),
            2
        );
    }

    #[test]
    fn refused_operation_writes_nothing() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.apply(&adjust(user_id, 10)).unwrap();

        let result = store.apply(&adjust(user_id, -11));
        assert!(matches!(
            result,
            Err(StoreError::Ledger(LedgerError::InsufficientCredits {
                available: 10,
                required: 11
            }))
        ));
        assert_eq!(store.get_credit(&user_id).unwrap().unwrap().balance, 10);
        assert_eq!(store.count_transactions(&user_id, None).unwrap(), 1);
    }

    #[test]
    fn reservation_lifecycle_is_idempotent() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let task_id = TaskId::generate();
        store.apply(&adjust(user_id, 50)).unwrap();

        let reserve = LedgerOperation::Reserve {
            user_id,
            amount: 20,
            task_id,
            description: None,
        };
        store.apply(&reserve).unwrap();
        assert!(matches!(
            store.apply(&reserve),
            Err(StoreError::Ledger(LedgerError::DuplicateIdempotencyKey { .. }))
        ));

        let confirm = LedgerOperation::Confirm {
            user_id,
            amount: 20,
            task_id,
            description: Some("Image generation".into()),
        };
        let entry = store.apply(&confirm).unwrap();
        assert_eq!(entry.credit.balance, 30);
        assert_eq!(entry.credit.reserved_balance, 0);
        assert_eq!(entry.credit.lifetime_used, 20);

        let found = store
            .find_transaction_by_idempotency_key(&format!("usage-{task_id}"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, entry.transaction.id);
        assert!(store
            .find_transaction_by_idempotency_key("usage-unknown")
            .unwrap()
            .is_none());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let user_id = UserId::generate();
        let settings = RateLimitSettings {
            config: RateLimitConfig::default(),
            updated_at: chrono::Utc::now(),
        };

        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.apply(&adjust(user_id, 42)).unwrap();
            store.put_rate_limit_settings(&settings).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.get_credit(&user_id).unwrap().unwrap().balance, 42);
        assert_eq!(store.get_rate_limit_settings().unwrap(), Some(settings));
    }
}
