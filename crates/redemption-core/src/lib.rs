//! Core types for the points redemption service.
//!
//! This crate provides the domain types shared by the store, chain, service
//! and client crates:
//!
//! - **Identifiers**: `UserId`, `ItemId`, `RedemptionId`, `EntryId`, `IdempotencyKey`
//! - **Accounts**: `Account` (points balance)
//! - **Ledger**: `LedgerEntry`, `EntryKind`, `DeductionState`
//! - **Catalog**: `Item`, `ItemPricing`
//! - **Redemptions**: `RedemptionRecord`, `RedemptionStatus`, `FailureKind`
//! - **Ownership**: `OwnershipRecord`
//!
//! # Units
//!
//! Points are whole numbers stored as `i64`; catalog costs are floored.
//! Settlement amounts are exact decimals converted to the token's smallest
//! unit only at the chain boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod amount;
pub mod error;
pub mod ids;
pub mod item;
pub mod ledger;
pub mod ownership;
pub mod redemption;

pub use account::Account;
pub use amount::{floor_points, to_smallest_units, AmountError};
pub use error::{RedemptionError, Result};
pub use ids::{
    EntryId, IdError, IdempotencyKey, ItemId, RedemptionId, UserId, MAX_IDEMPOTENCY_KEY_LEN,
    MAX_ITEM_ID_LEN,
};
pub use item::{Item, ItemPricing};
pub use ledger::{DeductionState, EntryKind, LedgerEntry};
pub use ownership::OwnershipRecord;
pub use redemption::{
    FailureKind, RedemptionRecord, RedemptionStatus, TransitionError, MANUAL_REVIEW_REASON,
};
