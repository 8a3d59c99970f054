//! Redemption records: the audit trail and idempotency anchor of every
//! attempt to exchange points for an on-chain transfer.
//!
//! A record is written in `Pending` right after the points are deducted and
//! is then finalized exactly once:
//!
//! ```text
//!         deduct+insert OK           transfer confirmed
//! [none] ───────────────────► pending ───────────────────► success
//!                                │  │  transfer failed + refund OK
//!                                │  └────────────────────────────► failed
//!                                │  transfer failed + refund FAILED
//!                                └───────────────────────────────► failed (manual_review)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{IdempotencyKey, ItemId, RedemptionId, UserId};

/// Reason stored on records escalated because compensation failed.
pub const MANUAL_REVIEW_REASON: &str = "transfer failed, refund failed: manual review";

/// Lifecycle state of a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    /// Points deducted, transfer not yet resolved.
    Pending,
    /// Transfer confirmed on-chain.
    Success,
    /// Transfer failed; points refunded unless flagged for manual review.
    Failed,
}

impl RedemptionStatus {
    /// Whether the status is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Get the status name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transfer did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The recipient address was rejected before submission.
    InvalidRecipient,
    /// The transaction could not be submitted.
    Submission,
    /// The transaction was submitted and then rejected by the chain.
    Rejected,
    /// The transaction was not confirmed before the deadline.
    ConfirmationTimeout,
}

impl FailureKind {
    /// Get the kind name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRecipient => "invalid_recipient",
            Self::Submission => "submission",
            Self::Rejected => "rejected",
            Self::ConfirmationTimeout => "confirmation_timeout",
        }
    }
}

/// An invalid status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid redemption transition from {from} to {to}")]
pub struct TransitionError {
    /// Current status.
    pub from: RedemptionStatus,
    /// Requested status.
    pub to: RedemptionStatus,
}

/// The aggregate root of the redemption workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    /// Record identifier (the `pending_id` handed to callers).
    pub id: RedemptionId,

    /// Globally unique idempotency key.
    pub idempotency_key: IdempotencyKey,

    /// The redeeming user.
    pub user_id: UserId,

    /// The redeemed item.
    pub item_id: ItemId,

    /// Recipient wallet address.
    pub wallet: String,

    /// Points deducted (snapshot of the item cost).
    pub amount_points: i64,

    /// Settlement amount in whole tokens (snapshot of the item worth).
    pub settlement_amount: Decimal,

    /// Settlement amount in the token's smallest unit.
    pub settlement_units: u64,

    /// Current status.
    pub status: RedemptionStatus,

    /// Chain transaction reference, set once the transfer is submitted.
    pub tx_reference: Option<String>,

    /// Why the transfer failed.
    pub failure_kind: Option<FailureKind>,

    /// Human-readable failure reason.
    pub failure_reason: Option<String>,

    /// Set when automated compensation failed and a human must intervene.
    #[serde(default)]
    pub manual_review: bool,

    /// When the record was created (the moment points were deducted).
    pub created_at: DateTime<Utc>,

    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl RedemptionRecord {
    /// Create a pending record.
    #[must_use]
    pub fn pending(
        idempotency_key: IdempotencyKey,
        user_id: UserId,
        item_id: ItemId,
        wallet: impl Into<String>,
        amount_points: i64,
        settlement_amount: Decimal,
        settlement_units: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RedemptionId::generate(),
            idempotency_key,
            user_id,
            item_id,
            wallet: wallet.into(),
            amount_points,
            settlement_amount,
            settlement_units,
            status: RedemptionStatus::Pending,
            tx_reference: None,
            failure_kind: None,
            failure_reason: None,
            manual_review: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the record reached a final status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Attach the submitted transaction reference to a pending record.
    ///
    /// # Errors
    ///
    /// Fails if the record is no longer pending or already carries a
    /// different reference.
    pub fn record_submission(&mut self, tx: &str) -> Result<(), TransitionError> {
        self.ensure_pending(RedemptionStatus::Pending)?;
        match &self.tx_reference {
            Some(existing) if existing != tx => Err(TransitionError {
                from: self.status,
                to: RedemptionStatus::Pending,
            }),
            _ => {
                self.tx_reference = Some(tx.to_string());
                self.touch();
                Ok(())
            }
        }
    }

    /// Mark the transfer as confirmed.
    ///
    /// # Errors
    ///
    /// Fails if the record is not pending.
    pub fn complete(&mut self, tx: &str) -> Result<(), TransitionError> {
        self.ensure_pending(RedemptionStatus::Success)?;
        self.status = RedemptionStatus::Success;
        self.tx_reference = Some(tx.to_string());
        self.touch();
        Ok(())
    }

    /// Mark the transfer as failed.
    ///
    /// # Errors
    ///
    /// Fails if the record is not pending.
    pub fn fail(&mut self, kind: FailureKind, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_pending(RedemptionStatus::Failed)?;
        self.status = RedemptionStatus::Failed;
        self.failure_kind = Some(kind);
        self.failure_reason = Some(reason.into());
        self.touch();
        Ok(())
    }

    /// Escalate the record to manual review.
    ///
    /// Allowed on failed records (refund did not go through) and on stale
    /// pending records whose chain outcome is unknown. A successful record
    /// never needs compensation.
    ///
    /// # Errors
    ///
    /// Fails if the record already succeeded.
    pub fn flag_manual_review(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        if self.status == RedemptionStatus::Success {
            return Err(TransitionError {
                from: self.status,
                to: RedemptionStatus::Failed,
            });
        }
        self.manual_review = true;
        self.failure_reason = Some(reason.into());
        self.touch();
        Ok(())
    }

    fn ensure_pending(&self, to: RedemptionStatus) -> Result<(), TransitionError> {
        if self.status == RedemptionStatus::Pending {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RedemptionRecord {
        RedemptionRecord::pending(
            IdempotencyKey::generate(),
            UserId::generate(),
            ItemId::from(1),
            "wallet",
            40,
            Decimal::from(2),
            2_000_000,
        )
    }

    #[test]
    fn pending_to_success() {
        let mut r = record();
        r.record_submission("sig").unwrap();
        r.complete("sig").unwrap();
        assert_eq!(r.status, RedemptionStatus::Success);
        assert_eq!(r.tx_reference.as_deref(), Some("sig"));
        assert!(r.is_terminal());
    }

    #[test]
    fn terminal_records_do_not_move() {
        let mut r = record();
        r.fail(FailureKind::Submission, "boom").unwrap();
        assert_eq!(
            r.complete("sig"),
            Err(TransitionError {
                from: RedemptionStatus::Failed,
                to: RedemptionStatus::Success,
            })
        );
        assert!(r.fail(FailureKind::Rejected, "again").is_err());
    }

    #[test]
    fn submission_reference_is_immutable() {
        let mut r = record();
        r.record_submission("sig-a").unwrap();
        r.record_submission("sig-a").unwrap();
        assert!(r.record_submission("sig-b").is_err());
    }

    #[test]
    fn manual_review_only_for_unsuccessful_records() {
        let mut failed = record();
        failed.fail(FailureKind::Rejected, "rejected").unwrap();
        failed.flag_manual_review(MANUAL_REVIEW_REASON).unwrap();
        assert!(failed.manual_review);
        assert_eq!(failed.failure_reason.as_deref(), Some(MANUAL_REVIEW_REASON));

        let mut done = record();
        done.complete("sig").unwrap();
        assert!(done.flag_manual_review("nope").is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&RedemptionStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
