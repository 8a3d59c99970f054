//! Resolution of pending records abandoned by a crashed or cut-off request.
//!
//! A record still `pending` long after its request must have ended is
//! resolved from the chain: confirmed transfers are finalized, rejected ones
//! refunded. When the chain cannot tell (no transaction reference recorded,
//! or a transaction that never landed) the record is flagged for manual
//! review instead of refunded, since a broadcast may still have happened.

use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use redemption_chain::{SignatureStatus, TransferError, TxReference};
use redemption_core::{RedemptionError, RedemptionRecord};

use super::orchestrator::{storage_error, Redeemer};

/// Stale records resolved concurrently per sweep.
const RECONCILE_CONCURRENCY: usize = 4;

/// Counts of one reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Stale pending records found.
    pub examined: usize,
    /// Confirmed on-chain and finalized as `success`.
    pub completed: usize,
    /// Rejected on-chain, marked `failed` and refunded.
    pub failed_refunded: usize,
    /// Flagged for manual review.
    pub escalated: usize,
    /// Left pending for the next sweep.
    pub deferred: usize,
}

enum Resolution {
    Completed,
    Refunded,
    Escalated,
    Deferred,
}

impl Redeemer {
    /// Resolve pending records created more than `older_than` ago.
    ///
    /// # Errors
    ///
    /// Returns an error if the stale records could not be listed. Failures on
    /// individual records are counted as deferred.
    pub async fn reconcile_stale(
        &self,
        older_than: Duration,
    ) -> Result<ReconcileReport, RedemptionError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| RedemptionError::Validation(format!("invalid staleness window: {e}")))?;
        let cutoff = Utc::now() - age;

        let stale = self
            .store_call(move |s| s.list_pending_older_than(cutoff))
            .await
            .map_err(storage_error)?;

        let mut report = ReconcileReport {
            examined: stale.len(),
            ..ReconcileReport::default()
        };
        if stale.is_empty() {
            return Ok(report);
        }
        tracing::info!(count = stale.len(), %cutoff, "Reconciling stale pending redemptions");

        let resolutions: Vec<Resolution> = futures::stream::iter(stale)
            .map(|record| self.reconcile_one(record))
            .buffer_unordered(RECONCILE_CONCURRENCY)
            .collect()
            .await;

        for resolution in resolutions {
            match resolution {
                Resolution::Completed => report.completed += 1,
                Resolution::Refunded => report.failed_refunded += 1,
                Resolution::Escalated => report.escalated += 1,
                Resolution::Deferred => report.deferred += 1,
            }
        }

        tracing::info!(
            completed = report.completed,
            failed_refunded = report.failed_refunded,
            escalated = report.escalated,
            deferred = report.deferred,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    async fn reconcile_one(&self, record: RedemptionRecord) -> Resolution {
        let span = tracing::info_span!(
            "reconcile",
            idempotency_key = %record.idempotency_key,
            user_id = %record.user_id,
        );
        self.resolve(record).instrument(span).await
    }

    async fn resolve(&self, mut record: RedemptionRecord) -> Resolution {
        let Some(tx) = record.tx_reference.clone().map(TxReference::new) else {
            return self
                .escalate(&mut record, "no transaction recorded before the request ended")
                .await;
        };

        match self.settlement().status(&tx).await {
            Ok(SignatureStatus::Confirmed) => match self.finalize_success(record, tx).await {
                Ok(_) => Resolution::Completed,
                Err(e) => {
                    tracing::error!(error = %e, "Confirmed transfer could not be finalized");
                    Resolution::Deferred
                }
            },
            Ok(SignatureStatus::Rejected(reason)) => {
                match self
                    .compensate(record, TransferError::Rejected { tx, reason })
                    .await
                {
                    Err(RedemptionError::ManualReviewRequired) => Resolution::Escalated,
                    Err(RedemptionError::Storage(e)) => {
                        tracing::error!(error = %e, "Rejected transfer could not be compensated");
                        Resolution::Deferred
                    }
                    _ => Resolution::Refunded,
                }
            }
            Ok(SignatureStatus::Pending) => {
                self.escalate(&mut record, "transaction unconfirmed past the staleness window")
                    .await
            }
            Err(e) => {
                tracing::warn!(%tx, error = %e, "Status query failed, leaving record pending");
                Resolution::Deferred
            }
        }
    }

    async fn escalate(&self, record: &mut RedemptionRecord, reason: &str) -> Resolution {
        tracing::warn!(reason, "Chain outcome unknown, flagging for manual review");
        if self.flag(record, reason).await {
            Resolution::Escalated
        } else {
            Resolution::Deferred
        }
    }
}

/// Run [`Redeemer::reconcile_stale`] every `every`, starting immediately.
pub fn spawn_reconciler(redeemer: Redeemer, every: Duration, older_than: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = redeemer.reconcile_stale(older_than).await {
                tracing::warn!(error = %e, "Reconciliation sweep failed");
            }
        }
    })
}
