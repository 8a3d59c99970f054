//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait
//! on top of a pessimistic `TransactionDB`.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options,
    Transaction, TransactionDB, TransactionDBOptions,
};

use redemption_core::{
    Account, DeductionState, FailureKind, IdempotencyKey, Item, ItemId, LedgerEntry,
    OwnershipRecord, RedemptionRecord, RedemptionStatus, TransitionError, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

type Db = TransactionDB<MultiThreaded>;
type Txn<'db> = Transaction<'db, Db>;

/// How often a transaction is retried after a lock conflict.
const MAX_TXN_ATTEMPTS: u32 = 5;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<Db>,
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

        let db = Db::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            cf_descriptors,
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a value outside any transaction.
    fn read<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Read a value and hold an exclusive lock on its key until the
    /// transaction ends. Absent keys are locked too.
    fn read_locked<T: serde::de::DeserializeOwned>(
        txn: &Txn<'_>,
        cf: &Arc<BoundColumnFamily<'_>>,
        key: &[u8],
    ) -> Result<Option<T>> {
        txn.get_for_update_cf(cf, key, true)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn lock_account(
        txn: &Txn<'_>,
        cf_accounts: &Arc<BoundColumnFamily<'_>>,
        user_id: &UserId,
    ) -> Result<Account> {
        Self::read_locked(txn, cf_accounts, &keys::account_key(user_id))?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "account",
                id: user_id.to_string(),
            }
        })
    }

    /// Write an updated account together with the ledger entry explaining it.
    fn write_balance_change(
        &self,
        txn: &Txn<'_>,
        account: &Account,
        entry: &LedgerEntry,
    ) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_entries = self.cf(cf::LEDGER_ENTRIES)?;
        let cf_by_user = self.cf(cf::ENTRIES_BY_USER)?;

        txn.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        )?;
        txn.put_cf(&cf_entries, keys::entry_key(&entry.id), Self::serialize(entry)?)?;
        txn.put_cf(&cf_by_user, keys::user_entry_key(&entry.user_id, &entry.id), [])?;
        Ok(())
    }

    /// Run `op` in a transaction and commit it, retrying on lock conflicts.
    ///
    /// An `Err` from `op` drops the transaction, which rolls it back.
    fn with_txn<T>(&self, mut op: impl FnMut(&Txn<'_>) -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            let txn = self.db.transaction();
            let result = match op(&txn) {
                Ok(value) => txn.commit().map(|()| value).map_err(StoreError::from),
                Err(e) => Err(e),
            };
            match result {
                Err(StoreError::Conflict(reason)) if attempt < MAX_TXN_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "Retrying conflicted transaction");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Apply a status change to a redemption record and keep the pending and
    /// manual-review indexes in step with it.
    fn update_redemption(
        &self,
        key: &IdempotencyKey,
        apply: impl Fn(&mut RedemptionRecord) -> std::result::Result<(), TransitionError>,
    ) -> Result<RedemptionRecord> {
        let cf_redemptions = self.cf(cf::REDEMPTIONS)?;
        let cf_pending = self.cf(cf::PENDING_REDEMPTIONS)?;
        let cf_review = self.cf(cf::MANUAL_REVIEW)?;
        let record_key = keys::redemption_key(key);

        self.with_txn(|txn| {
            let mut record: RedemptionRecord =
                Self::read_locked(txn, &cf_redemptions, &record_key)?.ok_or_else(|| {
                    StoreError::NotFound {
                        entity: "redemption",
                        id: key.to_string(),
                    }
                })?;

            let was_unresolved = is_unresolved(&record);
            apply(&mut record)?;

            txn.put_cf(&cf_redemptions, &record_key, Self::serialize(&record)?)?;
            if was_unresolved && !is_unresolved(&record) {
                txn.delete_cf(&cf_pending, keys::pending_key(record.created_at, key))?;
            }
            if record.manual_review {
                txn.put_cf(&cf_review, &record_key, [])?;
            }
            Ok(record)
        })
    }
}

/// Pending and not yet handed to a human.
fn is_unresolved(record: &RedemptionRecord) -> bool {
    record.status == RedemptionStatus::Pending && !record.manual_review
}

impl Store for RocksStore {
    // =========================================================================
    // Ledger
    // =========================================================================

    fn create_account(&self, account: &Account) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);

        self.with_txn(|txn| {
            if txn.get_for_update_cf(&cf_accounts, &key, true)?.is_some() {
                return Err(StoreError::AlreadyExists {
                    entity: "account",
                    id: account.user_id.to_string(),
                });
            }
            txn.put_cf(&cf_accounts, &key, Self::serialize(account)?)?;
            Ok(())
        })
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.read(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn grant_points(
        &self,
        user_id: &UserId,
        amount: i64,
        reference: &str,
        description: &str,
    ) -> Result<i64> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_refs = self.cf(cf::LEDGER_REFS)?;
        let ref_key = keys::grant_ref_key(reference);

        self.with_txn(|txn| {
            if txn.get_for_update_cf(&cf_refs, &ref_key, true)?.is_some() {
                return Err(StoreError::DuplicateReference {
                    reference: reference.to_string(),
                });
            }

            let mut account = Self::lock_account(txn, &cf_accounts, user_id)?;
            account.points_balance = account
                .points_balance
                .checked_add(amount)
                .ok_or(StoreError::InvalidAmount(amount))?;
            account.lifetime_earned = account.lifetime_earned.saturating_add(amount);
            account.updated_at = Utc::now();

            let entry = LedgerEntry::grant(
                *user_id,
                amount,
                account.points_balance,
                reference,
                description,
            );
            self.write_balance_change(txn, &account, &entry)?;
            txn.put_cf(&cf_refs, &ref_key, keys::entry_key(&entry.id))?;
            Ok(account.points_balance)
        })
    }

    fn deduct(&self, user_id: &UserId, amount: i64, reference: &str) -> Result<i64> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount(amount));
        }
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_refs = self.cf(cf::LEDGER_REFS)?;
        let ref_key = keys::deduction_ref_key(reference);

        self.with_txn(|txn| {
            let existing: Option<DeductionState> = Self::read_locked(txn, &cf_refs, &ref_key)?;
            if existing.is_some_and(|state| !state.refunded) {
                return Err(StoreError::DuplicateReference {
                    reference: reference.to_string(),
                });
            }

            let mut account = Self::lock_account(txn, &cf_accounts, user_id)?;
            if !account.has_sufficient_points(amount) {
                return Err(StoreError::InsufficientPoints {
                    balance: account.points_balance,
                    required: amount,
                });
            }
            account.points_balance -= amount;
            account.lifetime_redeemed += amount;
            account.updated_at = Utc::now();

            let entry = LedgerEntry::redemption(*user_id, amount, account.points_balance, reference);
            let state = DeductionState {
                user_id: *user_id,
                amount,
                refunded: false,
                updated_at: account.updated_at,
            };
            self.write_balance_change(txn, &account, &entry)?;
            txn.put_cf(&cf_refs, &ref_key, Self::serialize(&state)?)?;
            Ok(account.points_balance)
        })
    }

    fn refund(&self, user_id: &UserId, amount: i64, reference: &str) -> Result<i64> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_refs = self.cf(cf::LEDGER_REFS)?;
        let ref_key = keys::deduction_ref_key(reference);

        self.with_txn(|txn| {
            let mut state: DeductionState = Self::read_locked(txn, &cf_refs, &ref_key)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "deduction",
                    id: reference.to_string(),
                })?;
            if state.user_id != *user_id || state.amount != amount {
                return Err(StoreError::ReferenceMismatch {
                    reference: reference.to_string(),
                });
            }

            let mut account = Self::lock_account(txn, &cf_accounts, user_id)?;
            if state.refunded {
                return Ok(account.points_balance);
            }

            account.points_balance += amount;
            account.lifetime_redeemed -= amount;
            account.updated_at = Utc::now();
            state.refunded = true;
            state.updated_at = account.updated_at;

            let entry = LedgerEntry::refund(*user_id, amount, account.points_balance, reference);
            self.write_balance_change(txn, &account, &entry)?;
            txn.put_cf(&cf_refs, &ref_key, Self::serialize(&state)?)?;
            Ok(account.points_balance)
        })
    }

    fn deduction_state(&self, reference: &str) -> Result<Option<DeductionState>> {
        self.read(cf::LEDGER_REFS, &keys::deduction_ref_key(reference))
    }

    fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let cf_by_user = self.cf(cf::ENTRIES_BY_USER)?;
        let prefix = keys::account_key(user_id);
        let upper = keys::user_entries_upper_bound(user_id);

        // Walk the index backwards from the end of the user's range: newest first.
        let iter = self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&upper, Direction::Reverse));

        let mut entries = Vec::new();
        for item in iter.skip(offset) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) || entries.len() >= limit {
                break;
            }
            let entry_id = keys::entry_id_from_user_key(&key)
                .ok_or_else(|| StoreError::Database("corrupt ledger index key".to_string()))?;
            if let Some(entry) = self.read(cf::LEDGER_ENTRIES, &keys::entry_key(&entry_id))? {
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    fn put_item(&self, item: &Item) -> Result<()> {
        let cf_items = self.cf(cf::ITEMS)?;
        self.db
            .put_cf(&cf_items, keys::item_key(&item.item_id), Self::serialize(item)?)?;
        Ok(())
    }

    fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>> {
        self.read(cf::ITEMS, &keys::item_key(item_id))
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        let cf_items = self.cf(cf::ITEMS)?;
        let mut items = self
            .db
            .iterator_cf(&cf_items, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item?;
                Self::deserialize::<Item>(&value)
            })
            .collect::<Result<Vec<_>>>()?;

        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        Ok(items)
    }

    // =========================================================================
    // Redemption records
    // =========================================================================

    fn get_redemption(&self, key: &IdempotencyKey) -> Result<Option<RedemptionRecord>> {
        self.read(cf::REDEMPTIONS, &keys::redemption_key(key))
    }

    fn insert_pending(&self, record: &RedemptionRecord) -> Result<()> {
        if record.status != RedemptionStatus::Pending {
            return Err(TransitionError {
                from: record.status,
                to: RedemptionStatus::Pending,
            }
            .into());
        }
        let cf_redemptions = self.cf(cf::REDEMPTIONS)?;
        let cf_pending = self.cf(cf::PENDING_REDEMPTIONS)?;
        let record_key = keys::redemption_key(&record.idempotency_key);

        self.with_txn(|txn| {
            if txn
                .get_for_update_cf(&cf_redemptions, &record_key, true)?
                .is_some()
            {
                return Err(StoreError::DuplicateKey {
                    key: record.idempotency_key.to_string(),
                });
            }
            txn.put_cf(&cf_redemptions, &record_key, Self::serialize(record)?)?;
            txn.put_cf(
                &cf_pending,
                keys::pending_key(record.created_at, &record.idempotency_key),
                [],
            )?;
            Ok(())
        })
    }

    fn mark_submitted(&self, key: &IdempotencyKey, tx: &str) -> Result<RedemptionRecord> {
        self.update_redemption(key, |record| record.record_submission(tx))
    }

    fn mark_success(&self, key: &IdempotencyKey, tx: &str) -> Result<RedemptionRecord> {
        self.update_redemption(key, |record| record.complete(tx))
    }

    fn mark_failed(
        &self,
        key: &IdempotencyKey,
        kind: FailureKind,
        reason: &str,
    ) -> Result<RedemptionRecord> {
        self.update_redemption(key, |record| record.fail(kind, reason))
    }

    fn flag_manual_review(&self, key: &IdempotencyKey, reason: &str) -> Result<RedemptionRecord> {
        self.update_redemption(key, |record| record.flag_manual_review(reason))
    }

    fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<RedemptionRecord>> {
        let cf_pending = self.cf(cf::PENDING_REDEMPTIONS)?;
        let cutoff_millis = u64::try_from(cutoff.timestamp_millis()).unwrap_or(0);

        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf_pending, IteratorMode::Start) {
            let (key, _) = item?;
            let Some((millis, record_key)) = keys::split_pending_key(&key) else {
                tracing::warn!("Skipping malformed pending index key");
                continue;
            };
            if millis >= cutoff_millis {
                break;
            }
            if let Some(record) = self.read::<RedemptionRecord>(cf::REDEMPTIONS, record_key)? {
                if is_unresolved(&record) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn list_manual_review(&self) -> Result<Vec<RedemptionRecord>> {
        let cf_review = self.cf(cf::MANUAL_REVIEW)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf_review, IteratorMode::Start) {
            let (key, _) = item?;
            if let Some(record) = self.read::<RedemptionRecord>(cf::REDEMPTIONS, &key)? {
                records.push(record);
            }
        }
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    fn add_ownership(&self, record: &OwnershipRecord) -> Result<()> {
        let cf_ownership = self.cf(cf::OWNERSHIP)?;
        let key = keys::ownership_key(&record.user_id, &record.item_id);

        self.with_txn(|txn| {
            if txn.get_for_update_cf(&cf_ownership, &key, true)?.is_some() {
                return Err(StoreError::AlreadyExists {
                    entity: "ownership",
                    id: format!("{}/{}", record.user_id, record.item_id),
                });
            }
            txn.put_cf(&cf_ownership, &key, Self::serialize(record)?)?;
            Ok(())
        })
    }

    fn list_ownership(&self, user_id: &UserId) -> Result<Vec<OwnershipRecord>> {
        let cf_ownership = self.cf(cf::OWNERSHIP)?;
        let prefix = keys::user_ownership_prefix(user_id);

        let mut records = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_ownership, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(Self::deserialize::<OwnershipRecord>(&value)?);
        }
        records.sort_by_key(|record| record.acquired_at);
        Ok(records)
    }

    fn owns_item(&self, user_id: &UserId, item_id: &ItemId) -> Result<bool> {
        let cf_ownership = self.cf(cf::OWNERSHIP)?;
        Ok(self
            .db
            .get_cf(&cf_ownership, keys::ownership_key(user_id, item_id))?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redemption_core::{EntryKind, RedemptionId};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn funded_account(store: &RocksStore, points: i64) -> UserId {
        let user_id = UserId::generate();
        store.create_account(&Account::new(user_id)).unwrap();
        if points > 0 {
            store
                .grant_points(&user_id, points, &format!("seed-{user_id}"), "Seed")
                .unwrap();
        }
        user_id
    }

    fn pending_record(user_id: UserId, key: &str) -> RedemptionRecord {
        RedemptionRecord::pending(
            IdempotencyKey::from_str(key).unwrap(),
            user_id,
            ItemId::from(1),
            "wallet",
            40,
            Decimal::from(2),
            2_000_000,
        )
    }

    #[test]
    fn account_creation_is_unique() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        store.create_account(&Account::new(user_id)).unwrap();
        let result = store.create_account(&Account::new(user_id));
        assert!(matches!(result, Err(StoreError::AlreadyExists { entity: "account", .. })));
    }

    #[test]
    fn grants_are_idempotent_by_reference() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 0);

        assert_eq!(store.grant_points(&user_id, 100, "quest-1", "Quest").unwrap(), 100);
        let again = store.grant_points(&user_id, 100, "quest-1", "Quest");
        assert!(matches!(again, Err(StoreError::DuplicateReference { .. })));

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.points_balance, 100);
        assert_eq!(account.lifetime_earned, 100);
    }

    #[test]
    fn deduct_and_refund_journal() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 100);

        assert_eq!(store.deduct(&user_id, 40, "key-1").unwrap(), 60);

        // Second live deduction under the same reference is rejected before the balance check.
        let dup = store.deduct(&user_id, 40, "key-1");
        assert!(matches!(dup, Err(StoreError::DuplicateReference { .. })));

        assert_eq!(store.refund(&user_id, 40, "key-1").unwrap(), 100);
        // Refund retries are no-ops.
        assert_eq!(store.refund(&user_id, 40, "key-1").unwrap(), 100);

        let state = store.deduction_state("key-1").unwrap().unwrap();
        assert!(state.refunded);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.lifetime_redeemed, 0);

        // Refunded references may deduct again.
        assert_eq!(store.deduct(&user_id, 40, "key-1").unwrap(), 60);
    }

    #[test]
    fn refund_requires_matching_deduction() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 100);

        let missing = store.refund(&user_id, 40, "never-deducted");
        assert!(matches!(missing, Err(StoreError::NotFound { entity: "deduction", .. })));

        store.deduct(&user_id, 40, "key-2").unwrap();
        let mismatch = store.refund(&user_id, 41, "key-2");
        assert!(matches!(mismatch, Err(StoreError::ReferenceMismatch { .. })));
    }

    #[test]
    fn insufficient_points() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 10);

        let result = store.deduct(&user_id, 40, "key-3");
        assert!(matches!(
            result,
            Err(StoreError::InsufficientPoints {
                balance: 10,
                required: 40
            })
        ));
        assert!(store.deduction_state("key-3").unwrap().is_none());
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().points_balance, 10);
    }

    #[test]
    fn concurrent_deductions_never_overdraw() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = funded_account(&store, 100);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.deduct(&user_id, 30, &format!("race-{i}")))
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(successes, 3);
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().points_balance, 10);
    }

    #[test]
    fn ledger_entries_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 100);

        std::thread::sleep(std::time::Duration::from_millis(2)); // distinct ULID timestamps
        store.deduct(&user_id, 40, "key-4").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.refund(&user_id, 40, "key-4").unwrap();

        let entries = store.list_ledger_entries(&user_id, 10, 0).unwrap();
        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::Refund, EntryKind::Redemption, EntryKind::Grant]);
        assert_eq!(entries[1].amount, -40);
        assert_eq!(entries[1].balance_after, 60);

        let page = store.list_ledger_entries(&user_id, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].kind, EntryKind::Redemption);

        // Other users' entries stay out of the listing.
        funded_account(&store, 5);
        assert_eq!(store.list_ledger_entries(&user_id, 10, 0).unwrap().len(), 3);
    }

    #[test]
    fn catalog_lists_oldest_first() {
        let (store, _dir) = create_test_store();
        let first = Item::new(ItemId::from(2), "Sticker", Decimal::from(10), Decimal::ONE);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Item::new(ItemId::from(1), "Hoodie", Decimal::from(40), Decimal::from(2));
        store.put_item(&second).unwrap();
        store.put_item(&first).unwrap();

        let items = store.list_items().unwrap();
        assert_eq!(items, vec![first.clone(), second]);
        assert_eq!(store.get_item(&ItemId::from(2)).unwrap(), Some(first));
        assert!(store.get_item(&ItemId::from(3)).unwrap().is_none());
    }

    #[test]
    fn redemption_keys_are_unique() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        store.insert_pending(&pending_record(user_id, "dup")).unwrap();
        let result = store.insert_pending(&pending_record(user_id, "dup"));
        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
    }

    #[test]
    fn redemption_lifecycle() {
        let (store, _dir) = create_test_store();
        let record = pending_record(UserId::generate(), "life");
        let key = record.idempotency_key.clone();
        store.insert_pending(&record).unwrap();

        let submitted = store.mark_submitted(&key, "sig").unwrap();
        assert_eq!(submitted.status, RedemptionStatus::Pending);
        assert_eq!(submitted.tx_reference.as_deref(), Some("sig"));

        let done = store.mark_success(&key, "sig").unwrap();
        assert_eq!(done.status, RedemptionStatus::Success);

        let again = store.mark_failed(&key, FailureKind::Rejected, "late");
        assert!(matches!(again, Err(StoreError::InvalidTransition(_))));
        assert_eq!(store.get_redemption(&key).unwrap(), Some(done));

        let missing = store.mark_success(&IdempotencyKey::from_str("nope").unwrap(), "sig");
        assert!(matches!(missing, Err(StoreError::NotFound { entity: "redemption", .. })));
    }

    #[test]
    fn pending_index_tracks_unresolved_records() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let stale = pending_record(user_id, "stale");
        let flagged = pending_record(user_id, "flagged");
        let finished = pending_record(user_id, "finished");
        for record in [&stale, &flagged, &finished] {
            store.insert_pending(record).unwrap();
        }
        store.mark_failed(&finished.idempotency_key, FailureKind::Submission, "boom").unwrap();
        store.flag_manual_review(&flagged.idempotency_key, "unknown").unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let pending = store.list_pending_older_than(cutoff).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].idempotency_key, stale.idempotency_key);

        let old_cutoff = Utc::now() - chrono::Duration::hours(1);
        assert!(store.list_pending_older_than(old_cutoff).unwrap().is_empty());

        let review = store.list_manual_review().unwrap();
        assert_eq!(review.len(), 1);
        assert!(review[0].manual_review);
        assert_eq!(review[0].status, RedemptionStatus::Pending);
    }

    #[test]
    fn ownership_is_unique_per_user_and_item() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let record = OwnershipRecord::new(user_id, ItemId::from(1), RedemptionId::generate());

        store.add_ownership(&record).unwrap();
        assert!(store.owns_item(&user_id, &ItemId::from(1)).unwrap());
        assert!(!store.owns_item(&user_id, &ItemId::from(2)).unwrap());

        let dup = store.add_ownership(&record);
        assert!(matches!(dup, Err(StoreError::AlreadyExists { entity: "ownership", .. })));

        store
            .add_ownership(&OwnershipRecord::new(
                UserId::generate(),
                ItemId::from(1),
                RedemptionId::generate(),
            ))
            .unwrap();
        assert_eq!(store.list_ownership(&user_id).unwrap(), vec![record]);
    }
}
