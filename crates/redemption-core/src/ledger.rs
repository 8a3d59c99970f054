//! Ledger entries for the points balance.
//!
//! Every change to an account's balance writes a ledger entry in the same
//! atomic batch. Entries use ULIDs for time-ordered IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, UserId};

/// A single balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Signed amount in points. Positive = credit, negative = debit.
    pub amount: i64,

    /// What caused the change.
    pub kind: EntryKind,

    /// Balance after this entry.
    pub balance_after: i64,

    /// Idempotency reference the change was journaled under.
    pub reference: String,

    /// Human-readable description.
    pub description: String,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a grant entry (points earned elsewhere).
    #[must_use]
    pub fn grant(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::build(user_id, amount.abs(), EntryKind::Grant, balance_after, reference, description)
    }

    /// Create a redemption deduction entry.
    #[must_use]
    pub fn redemption(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        reference: impl Into<String>,
    ) -> Self {
        Self::build(
            user_id,
            -amount.abs(),
            EntryKind::Redemption,
            balance_after,
            reference,
            "Points redeemed",
        )
    }

    /// Create a refund entry compensating a redemption deduction.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        reference: impl Into<String>,
    ) -> Self {
        Self::build(
            user_id,
            amount.abs(),
            EntryKind::Refund,
            balance_after,
            reference,
            "Redemption refunded",
        )
    }

    fn build(
        user_id: UserId,
        amount: i64,
        kind: EntryKind,
        balance_after: i64,
        reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            amount,
            kind,
            balance_after,
            reference: reference.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ledger entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Points granted to the user.
    Grant,
    /// Points deducted for a redemption.
    Redemption,
    /// Points returned after a failed redemption.
    Refund,
}

impl EntryKind {
    /// Get the kind name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Redemption => "redemption",
            Self::Refund => "refund",
        }
    }
}

/// Journal state of a redemption reference.
///
/// The ledger keeps one of these per idempotency key so that deductions and
/// refunds for the same redemption are applied at most once each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionState {
    /// The user the deduction was taken from.
    pub user_id: UserId,

    /// Points deducted.
    pub amount: i64,

    /// Whether the deduction has since been refunded.
    pub refunded: bool,

    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}
