//! The redemption saga.
//!
//! A redemption spans three systems that share no transaction: the points
//! ledger, the redemption records and the settlement chain. The saga runs
//!
//! 1. deduct points (journaled under the idempotency key),
//! 2. write the `pending` record,
//! 3. submit the transfer and wait for confirmation,
//! 4. finalize the record and grant ownership,
//!
//! and undoes step 1 with a refund when a later step fails. A refund that
//! cannot be applied leaves the record `failed` with `manual_review` set.
//!
//! Requests that arrive with a key another request is already working on join
//! that attempt and answer with its outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::Instrument;

use redemption_chain::{Settlement, SettlementChain, TransferError, TxReference};
use redemption_core::{
    to_smallest_units, FailureKind, IdempotencyKey, ItemId, OwnershipRecord, RedemptionError,
    RedemptionRecord, UserId, MANUAL_REVIEW_REASON,
};
use redemption_store::{Store, StoreError};

use super::outcome::{outcome_from_record, RedemptionOutcome};

/// Tunables of the orchestrator.
#[derive(Debug, Clone)]
pub struct RedemptionPolicy {
    /// Decimals of the settlement token.
    pub token_decimals: u8,

    /// Refund attempts before escalating to manual review.
    pub refund_max_attempts: u32,

    /// Delay before the first refund retry; doubles per attempt.
    pub refund_retry_base: Duration,

    /// Delay between record polls while joining another attempt.
    pub join_poll_interval: Duration,

    /// Slack on top of the worst-case attempt duration when joining.
    pub join_grace: Duration,
}

impl Default for RedemptionPolicy {
    fn default() -> Self {
        Self {
            token_decimals: 6,
            refund_max_attempts: 5,
            refund_retry_base: Duration::from_millis(100),
            join_poll_interval: Duration::from_millis(50),
            join_grace: Duration::from_secs(5),
        }
    }
}

impl RedemptionPolicy {
    /// Total backoff slept while retrying one refund.
    #[must_use]
    pub fn refund_budget(&self) -> Duration {
        (0..self.refund_max_attempts.saturating_sub(1))
            .map(|attempt| self.refund_retry_base.saturating_mul(1u32 << attempt.min(16)))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Longest an attempt can stay unresolved while its request is alive,
    /// given the longest its transfer may take (submission plus confirmation).
    #[must_use]
    pub fn join_window(&self, transfer_timeout: Duration) -> Duration {
        transfer_timeout
            .saturating_add(self.refund_budget())
            .saturating_add(self.join_grace)
    }
}

/// A validated redemption request.
#[derive(Debug, Clone)]
pub struct RedeemRequest {
    /// The redeeming user.
    pub user_id: UserId,
    /// The catalog item.
    pub item_id: ItemId,
    /// Recipient wallet address.
    pub wallet: String,
    /// Caller-supplied key; generated when absent.
    pub idempotency_key: Option<IdempotencyKey>,
}

/// Runs redemptions against a store and a settlement chain.
#[derive(Clone)]
pub struct Redeemer {
    store: Arc<dyn Store>,
    settlement: Settlement<dyn SettlementChain>,
    policy: RedemptionPolicy,
}

impl Redeemer {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        settlement: Settlement<dyn SettlementChain>,
        policy: RedemptionPolicy,
    ) -> Self {
        Self {
            store,
            settlement,
            policy,
        }
    }

    /// The orchestrator's policy.
    #[must_use]
    pub fn policy(&self) -> &RedemptionPolicy {
        &self.policy
    }

    /// Redeem an item for points.
    ///
    /// # Errors
    ///
    /// - `Validation` / `NotFound` / `InsufficientFunds` / `AlreadyOwned`
    ///   before any side effect.
    /// - `ChainSubmission` / `ChainConfirmationTimeout` once the points are
    ///   back on the balance.
    /// - `ManualReviewRequired` if they could not be returned.
    /// - `Storage` if the attempt was aborted cleanly and may be retried with
    ///   the same key.
    pub async fn redeem(
        &self,
        request: RedeemRequest,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        let key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(IdempotencyKey::generate);
        let span = tracing::info_span!(
            "redeem",
            user_id = %request.user_id,
            item_id = %request.item_id,
            idempotency_key = %key,
        );
        self.run(request, key).instrument(span).await
    }

    async fn run(
        &self,
        request: RedeemRequest,
        key: IdempotencyKey,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        let RedeemRequest {
            user_id,
            item_id,
            wallet,
            ..
        } = request;

        // A known key answers with its own record, whatever else was sent.
        if let Some(record) = self.find_record(&key).await? {
            return self.resume(&key, record).await;
        }

        self.settlement
            .chain()
            .validate_address(&wallet)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected wallet address");
                RedemptionError::Validation("invalid wallet address".to_string())
            })?;

        let (item, account, owned) = tokio::try_join!(
            self.store_call({
                let item_id = item_id.clone();
                move |s| s.get_item(&item_id)
            }),
            self.store_call(move |s| s.get_account(&user_id)),
            self.store_call({
                let item_id = item_id.clone();
                move |s| s.owns_item(&user_id, &item_id)
            }),
        )
        .map_err(storage_error)?;

        let item = item.ok_or_else(|| RedemptionError::NotFound {
            entity: "item",
            id: item_id.to_string(),
        })?;
        if account.is_none() {
            return Err(RedemptionError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            });
        }
        if owned {
            // The owning attempt may be this very key, finished in between.
            if let Some(record) = self.find_record(&key).await? {
                return self.resume(&key, record).await;
            }
            return Err(RedemptionError::AlreadyOwned);
        }

        let pricing = item.pricing()?;
        let units = to_smallest_units(pricing.worth, self.policy.token_decimals)?;
        let cost = pricing.cost_points;

        match self
            .store_call({
                let key = key.clone();
                move |s| s.deduct(&user_id, cost, key.as_str())
            })
            .await
        {
            Ok(balance) => tracing::debug!(cost, balance, "Points deducted"),
            Err(StoreError::DuplicateReference { .. }) => {
                tracing::info!("Another request holds this key, joining it");
                return self.join(&key, None).await;
            }
            Err(e) => return Err(storage_error(e)),
        }

        let mut record = RedemptionRecord::pending(
            key.clone(),
            user_id,
            item_id,
            wallet,
            cost,
            pricing.worth,
            units,
        );
        if let Err(e) = self
            .store_call({
                let record = record.clone();
                move |s| s.insert_pending(&record)
            })
            .await
        {
            return self.abort_unrecorded(&record, e).await;
        }
        tracing::info!(redemption_id = %record.id, units, "Redemption pending");

        let tx = match self.settlement.submit(&record.wallet, units).await {
            Ok(tx) => tx,
            Err(err) => return self.compensate(record, err).await,
        };
        self.record_submission(&mut record, &tx).await;

        match self.settlement.await_confirmation(tx).await {
            Ok(receipt) => self.finalize_success(record, receipt.tx).await,
            Err(err) => self.compensate(record, err).await,
        }
    }

    async fn find_record(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<RedemptionRecord>, RedemptionError> {
        let key = key.clone();
        self.store_call(move |s| s.get_redemption(&key))
            .await
            .map_err(storage_error)
    }

    /// Answer for a key that already has a record.
    async fn resume(
        &self,
        key: &IdempotencyKey,
        record: RedemptionRecord,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        if record.is_terminal() || record.manual_review {
            tracing::info!(status = %record.status, "Replaying stored redemption");
            return Ok(RedemptionOutcome::Replayed(record));
        }
        tracing::info!("Redemption in flight, joining it");
        self.join(key, Some(record.created_at)).await
    }

    /// Wait for the attempt owning `key` to resolve and share its outcome.
    ///
    /// Gives up once the owner must have finished, returning the record as it
    /// stands.
    async fn join(
        &self,
        key: &IdempotencyKey,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        let window = self
            .policy
            .join_window(self.settlement.max_transfer_duration());
        let elapsed = started_at
            .and_then(|t| (Utc::now() - t).to_std().ok())
            .unwrap_or_default();
        let deadline = Instant::now() + window.saturating_sub(elapsed);

        loop {
            let expired = Instant::now() >= deadline;
            match self.find_record(key).await? {
                Some(record) if record.is_terminal() => return outcome_from_record(&record),
                Some(record) if record.manual_review || expired => {
                    tracing::info!("Joined attempt unresolved, returning its current state");
                    return Ok(RedemptionOutcome::Replayed(record));
                }
                Some(_) => {}
                None => {
                    let reference = key.clone();
                    let state = self
                        .store_call(move |s| s.deduction_state(reference.as_str()))
                        .await
                        .map_err(storage_error)?;
                    if expired || state.is_some_and(|s| s.refunded) {
                        return Err(RedemptionError::Storage(
                            "concurrent attempt for this key was aborted".to_string(),
                        ));
                    }
                }
            }
            tokio::time::sleep(self.policy.join_poll_interval).await;
        }
    }

    /// Return the points of a deduction whose pending record was never written.
    async fn abort_unrecorded(
        &self,
        record: &RedemptionRecord,
        err: StoreError,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        let duplicate = matches!(err, StoreError::DuplicateKey { .. });
        if duplicate {
            tracing::info!("Record written by a concurrent request, returning deducted points");
        } else {
            tracing::error!(error = %err, "Pending record not written, returning deducted points");
        }

        if let Err(refund_err) = self
            .refund_with_retry(record.user_id, record.amount_points, &record.idempotency_key)
            .await
        {
            tracing::error!(
                user_id = %record.user_id,
                idempotency_key = %record.idempotency_key,
                amount = record.amount_points,
                error = %refund_err,
                "Points deducted without a record and refund failed; manual review required"
            );
            return Err(RedemptionError::ManualReviewRequired);
        }

        if duplicate {
            self.join(&record.idempotency_key, None).await
        } else {
            Err(storage_error(err))
        }
    }

    async fn record_submission(&self, record: &mut RedemptionRecord, tx: &TxReference) {
        if let Err(e) = record.record_submission(tx.as_str()) {
            tracing::warn!(%tx, error = %e, "Submission does not fit the record");
            return;
        }
        let key = record.idempotency_key.clone();
        let tx = tx.as_str().to_owned();
        if let Err(e) = self.store_call(move |s| s.mark_submitted(&key, &tx)).await {
            tracing::warn!(error = %e, "Transaction reference not recorded, continuing");
        }
    }

    /// Finalize a confirmed transfer: mark success and grant ownership.
    pub(crate) async fn finalize_success(
        &self,
        mut record: RedemptionRecord,
        tx: TxReference,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        record
            .complete(tx.as_str())
            .map_err(|e| RedemptionError::Storage(e.to_string()))?;

        let tx = tx.into_inner();
        let ownership = OwnershipRecord::new(record.user_id, record.item_id.clone(), record.id);
        let (marked, owned) = tokio::join!(
            self.store_call({
                let key = record.idempotency_key.clone();
                let tx = tx.clone();
                move |s| s.mark_success(&key, &tx)
            }),
            self.store_call(move |s| s.add_ownership(&ownership)),
        );

        // The transfer is final either way; unrecorded state is left to the
        // reconciler and operators.
        if let Err(e) = marked {
            tracing::error!(%tx, error = %e, "Transfer confirmed but success not recorded");
        }
        match owned {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                tracing::warn!("Item was already owned when the transfer confirmed");
            }
            Err(e) => {
                tracing::error!(%tx, error = %e, "Transfer confirmed but ownership not recorded");
            }
        }

        tracing::info!(%tx, redemption_id = %record.id, "Redemption completed");
        outcome_from_record(&record)
    }

    /// Mark a failed transfer and return the points, escalating if that fails.
    pub(crate) async fn compensate(
        &self,
        mut record: RedemptionRecord,
        err: TransferError,
    ) -> Result<RedemptionOutcome, RedemptionError> {
        let kind = failure_kind(&err);
        let reason = err.to_string();
        tracing::warn!(error = %reason, kind = kind.as_str(), "Transfer failed, refunding points");

        record
            .fail(kind, reason.clone())
            .map_err(|e| RedemptionError::Storage(e.to_string()))?;
        let key = record.idempotency_key.clone();
        if let Err(e) = self
            .store_call(move |s| s.mark_failed(&key, kind, &reason))
            .await
        {
            tracing::error!(error = %e, "Failed status not recorded");
        }

        match self
            .refund_with_retry(record.user_id, record.amount_points, &record.idempotency_key)
            .await
        {
            Ok(balance) => tracing::info!(balance, "Points refunded"),
            Err(e) => {
                tracing::error!(
                    amount = record.amount_points,
                    error = %e,
                    "Refund failed, escalating to manual review"
                );
                self.flag(&mut record, MANUAL_REVIEW_REASON).await;
            }
        }

        outcome_from_record(&record)
    }

    /// Flag a record for manual review. Returns whether the flag was stored.
    pub(crate) async fn flag(&self, record: &mut RedemptionRecord, reason: &str) -> bool {
        if let Err(e) = record.flag_manual_review(reason) {
            tracing::error!(error = %e, "Record cannot be flagged for manual review");
            return false;
        }
        let key = record.idempotency_key.clone();
        let reason = reason.to_owned();
        match self
            .store_call(move |s| s.flag_manual_review(&key, &reason))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Manual review flag not recorded");
                false
            }
        }
    }

    async fn refund_with_retry(
        &self,
        user_id: UserId,
        amount: i64,
        key: &IdempotencyKey,
    ) -> redemption_store::Result<i64> {
        let mut delay = self.policy.refund_retry_base;
        let mut attempt = 1;
        loop {
            let reference = key.clone();
            match self
                .store_call(move |s| s.refund(&user_id, amount, reference.as_str()))
                .await
            {
                Ok(balance) => return Ok(balance),
                Err(e) if attempt < self.policy.refund_max_attempts => {
                    tracing::warn!(attempt, error = %e, "Refund attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a store operation on the blocking pool.
    pub(crate) async fn store_call<T, F>(&self, op: F) -> redemption_store::Result<T>
    where
        F: FnOnce(&dyn Store) -> redemption_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StoreError::Database(format!("store task failed: {e}")))?
    }

    pub(crate) fn settlement(&self) -> &Settlement<dyn SettlementChain> {
        &self.settlement
    }
}

fn failure_kind(err: &TransferError) -> FailureKind {
    match err {
        TransferError::InvalidAddress(_) => FailureKind::InvalidRecipient,
        TransferError::Submission(_) => FailureKind::Submission,
        TransferError::Rejected { .. } => FailureKind::Rejected,
        TransferError::ConfirmationTimeout { .. } => FailureKind::ConfirmationTimeout,
    }
}

pub(crate) fn storage_error(err: StoreError) -> RedemptionError {
    match err {
        StoreError::NotFound { entity, id } => RedemptionError::NotFound { entity, id },
        StoreError::InsufficientPoints { balance, required } => {
            RedemptionError::InsufficientFunds { balance, required }
        }
        other => RedemptionError::Storage(other.to_string()),
    }
}
