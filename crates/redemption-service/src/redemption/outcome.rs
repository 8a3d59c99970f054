//! What a redemption attempt resolved to.

use redemption_core::{FailureKind, RedemptionError, RedemptionId, RedemptionRecord, RedemptionStatus};

/// Result of a redemption call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionOutcome {
    /// The transfer confirmed and the item is owned.
    Completed {
        /// The redemption record id.
        redemption_id: RedemptionId,
        /// The confirmed transaction.
        tx: String,
    },

    /// The key was seen before; this is the stored record as it stands.
    Replayed(RedemptionRecord),
}

/// Derive the caller-visible outcome from a record.
///
/// The attempt that ran the saga and any request that joined it both answer
/// through here, so they return the same payload.
pub(crate) fn outcome_from_record(
    record: &RedemptionRecord,
) -> Result<RedemptionOutcome, RedemptionError> {
    match record.status {
        RedemptionStatus::Success => Ok(RedemptionOutcome::Completed {
            redemption_id: record.id,
            tx: record.tx_reference.clone().unwrap_or_default(),
        }),
        RedemptionStatus::Failed if record.manual_review => {
            Err(RedemptionError::ManualReviewRequired)
        }
        RedemptionStatus::Failed => Err(match record.failure_kind {
            Some(FailureKind::ConfirmationTimeout) => RedemptionError::ChainConfirmationTimeout,
            Some(FailureKind::InvalidRecipient) => {
                RedemptionError::ChainSubmission("invalid recipient address".to_string())
            }
            Some(FailureKind::Rejected) => {
                RedemptionError::ChainSubmission("transaction rejected".to_string())
            }
            Some(FailureKind::Submission) | None => {
                RedemptionError::ChainSubmission("transaction could not be submitted".to_string())
            }
        }),
        RedemptionStatus::Pending => Ok(RedemptionOutcome::Replayed(record.clone())),
    }
}
