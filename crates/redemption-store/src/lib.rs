//! `RocksDB` storage layer for the redemption service.
//!
//! This crate holds the three systems of record the redemption workflow
//! touches on the off-chain side: the points ledger, the item catalog and the
//! redemption audit log (plus ownership records).
//!
//! # Architecture
//!
//! The database is a pessimistic `TransactionDB`. Every balance mutation and
//! every redemption status change runs in one transaction that locks the rows
//! it reads with `get_for_update`, so concurrent deductions for the same user
//! serialize in the storage layer rather than in application code.
//!
//! Column families are listed in [`schema::cf`].
//!
//! # Example
//!
//! ```no_run
//! use redemption_store::{RocksStore, Store};
//! use redemption_core::{Account, UserId};
//!
//! let store = RocksStore::open("/tmp/redemption-db").unwrap();
//!
//! let user_id = UserId::generate();
//! store.create_account(&Account::new(user_id)).unwrap();
//! store.grant_points(&user_id, 100, "signup", "Signup bonus").unwrap();
//!
//! let balance = store.deduct(&user_id, 40, "1700000000000-key").unwrap();
//! assert_eq!(balance, 60);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use redemption_core::{
    Account, DeductionState, FailureKind, IdempotencyKey, Item, ItemId, LedgerEntry,
    OwnershipRecord, RedemptionRecord, UserId,
};

/// The storage trait defining all database operations.
///
/// Calls are synchronous; async callers run them on a blocking thread.
pub trait Store: Send + Sync {
    // =========================================================================
    // Ledger
    // =========================================================================

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has one.
    fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Credit points earned elsewhere, journaled under `reference`.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidAmount` if `amount` is not positive.
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::DuplicateReference` if the reference was already granted.
    fn grant_points(
        &self,
        user_id: &UserId,
        amount: i64,
        reference: &str,
        description: &str,
    ) -> Result<i64>;

    /// Atomically deduct points for a redemption.
    ///
    /// The reference journal is checked before the balance: a live deduction
    /// under the same reference fails without touching the account. A
    /// reference whose deduction was refunded may deduct again.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateReference` if a live deduction exists.
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientPoints` if the balance is too low.
    fn deduct(&self, user_id: &UserId, amount: i64, reference: &str) -> Result<i64>;

    /// Atomically return the points deducted under `reference`.
    ///
    /// Refunding an already refunded reference is a no-op that returns the
    /// current balance, so callers may retry freely.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if nothing was deducted under the reference.
    /// - `StoreError::ReferenceMismatch` if user or amount differ from the deduction.
    fn refund(&self, user_id: &UserId, amount: i64, reference: &str) -> Result<i64>;

    /// Journal state of a deduction reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn deduction_state(&self, reference: &str) -> Result<Option<DeductionState>>;

    /// List ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Insert or replace a catalog item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_item(&self, item: &Item) -> Result<()>;

    /// Get a catalog item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>>;

    /// List the catalog, oldest item first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_items(&self) -> Result<Vec<Item>>;

    // =========================================================================
    // Redemption records
    // =========================================================================

    /// Get a redemption record by idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_redemption(&self, key: &IdempotencyKey) -> Result<Option<RedemptionRecord>>;

    /// Insert a new pending record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateKey` if a record with the key exists.
    fn insert_pending(&self, record: &RedemptionRecord) -> Result<()>;

    /// Attach the submitted transaction reference to a pending record.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the record doesn't exist.
    /// - `StoreError::InvalidTransition` if the record is no longer pending.
    fn mark_submitted(&self, key: &IdempotencyKey, tx: &str) -> Result<RedemptionRecord>;

    /// Finalize a pending record as `success`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the record doesn't exist.
    /// - `StoreError::InvalidTransition` if the record is not pending.
    fn mark_success(&self, key: &IdempotencyKey, tx: &str) -> Result<RedemptionRecord>;

    /// Finalize a pending record as `failed`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the record doesn't exist.
    /// - `StoreError::InvalidTransition` if the record is not pending.
    fn mark_failed(
        &self,
        key: &IdempotencyKey,
        kind: FailureKind,
        reason: &str,
    ) -> Result<RedemptionRecord>;

    /// Flag a record for manual review.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the record doesn't exist.
    /// - `StoreError::InvalidTransition` if the record succeeded.
    fn flag_manual_review(&self, key: &IdempotencyKey, reason: &str) -> Result<RedemptionRecord>;

    /// Unresolved pending records created before `cutoff`, oldest first.
    ///
    /// Records already flagged for manual review are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<RedemptionRecord>>;

    /// Records flagged for manual review.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_manual_review(&self) -> Result<Vec<RedemptionRecord>>;

    // =========================================================================
    // Ownership
    // =========================================================================

    /// Record that a user owns an item.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already owns it.
    fn add_ownership(&self, record: &OwnershipRecord) -> Result<()>;

    /// Items owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_ownership(&self, user_id: &UserId) -> Result<Vec<OwnershipRecord>>;

    /// Whether a user owns an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn owns_item(&self, user_id: &UserId, item_id: &ItemId) -> Result<bool>;
}
