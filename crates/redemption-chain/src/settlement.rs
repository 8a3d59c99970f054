//! Submission and bounded confirmation polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::TransferError;
use crate::{SettlementChain, SignatureStatus, TxReference};

/// A confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// The confirmed transaction.
    pub tx: TxReference,
}

/// Drives transfers on a [`SettlementChain`] to a definitive outcome.
pub struct Settlement<C: ?Sized> {
    chain: Arc<C>,
    submission_timeout: Duration,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl<C: ?Sized> Clone for Settlement<C> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            submission_timeout: self.submission_timeout,
            confirmation_timeout: self.confirmation_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

impl<C: SettlementChain + ?Sized> Settlement<C> {
    /// Wrap a chain with 30s submission and confirmation timeouts, polled
    /// every 500ms.
    #[must_use]
    pub fn new(chain: Arc<C>) -> Self {
        Self {
            chain,
            submission_timeout: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Set the submission timeout.
    #[must_use]
    pub fn with_submission_timeout(mut self, timeout: Duration) -> Self {
        self.submission_timeout = timeout;
        self
    }

    /// Set the confirmation timeout.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The submission timeout.
    #[must_use]
    pub fn submission_timeout(&self) -> Duration {
        self.submission_timeout
    }

    /// The confirmation timeout.
    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    /// Longest a transfer can take from submission to a definitive outcome.
    #[must_use]
    pub fn max_transfer_duration(&self) -> Duration {
        self.submission_timeout
            .saturating_add(self.confirmation_timeout)
    }

    /// The wrapped chain.
    #[must_use]
    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    /// Validate the recipient and broadcast a transfer.
    ///
    /// # Errors
    ///
    /// `InvalidAddress` before anything is sent, `Submission` if the
    /// broadcast failed or did not finish within the submission timeout.
    pub async fn submit(&self, recipient: &str, units: u64) -> Result<TxReference, TransferError> {
        self.chain
            .validate_address(recipient)
            .map_err(|e| TransferError::InvalidAddress(e.to_string()))?;

        match tokio::time::timeout(
            self.submission_timeout,
            self.chain.submit_transfer(recipient, units),
        )
        .await
        {
            Ok(result) => result.map_err(|e| TransferError::Submission(e.to_string())),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.submission_timeout.as_millis(),
                    "Transfer submission timed out"
                );
                Err(TransferError::Submission(format!(
                    "submission timed out after {}ms",
                    self.submission_timeout.as_millis()
                )))
            }
        }
    }

    /// Poll until `tx` is confirmed, rejected, or the timeout passes.
    ///
    /// Transient query errors are logged and polled through.
    ///
    /// # Errors
    ///
    /// `Rejected` or `ConfirmationTimeout`, both carrying `tx`.
    pub async fn await_confirmation(&self, tx: TxReference) -> Result<TransferReceipt, TransferError> {
        let deadline = Instant::now() + self.confirmation_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(%tx, "Transfer not confirmed before deadline");
                return Err(TransferError::ConfirmationTimeout { tx });
            }

            match tokio::time::timeout(remaining, self.chain.signature_status(&tx)).await {
                Ok(Ok(SignatureStatus::Confirmed)) => {
                    tracing::info!(%tx, "Transfer confirmed");
                    return Ok(TransferReceipt { tx });
                }
                Ok(Ok(SignatureStatus::Rejected(reason))) => {
                    tracing::warn!(%tx, %reason, "Transfer rejected");
                    return Err(TransferError::Rejected { tx, reason });
                }
                Ok(Ok(SignatureStatus::Pending)) | Err(_) => {}
                Ok(Err(e)) => {
                    tracing::debug!(%tx, error = %e, "Status query failed, polling again");
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Submit a transfer and wait for its confirmation.
    ///
    /// # Errors
    ///
    /// Any [`TransferError`].
    pub async fn transfer(&self, recipient: &str, units: u64) -> Result<TransferReceipt, TransferError> {
        let tx = self.submit(recipient, units).await?;
        self.await_confirmation(tx).await
    }

    /// Single status query, used when reconciling old submissions.
    ///
    /// # Errors
    ///
    /// Returns the chain error if the node could not be queried.
    pub async fn status(&self, tx: &TxReference) -> crate::Result<SignatureStatus> {
        self.chain.signature_status(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Chain answering status queries from a script; the last answer repeats.
    struct ScriptedChain {
        submit_fails: bool,
        submit_delay: Duration,
        statuses: Mutex<VecDeque<crate::Result<SignatureStatus>>>,
        polls: AtomicUsize,
    }

    impl ScriptedChain {
        fn new(statuses: Vec<crate::Result<SignatureStatus>>) -> Arc<Self> {
            Arc::new(Self {
                submit_fails: false,
                submit_delay: Duration::ZERO,
                statuses: Mutex::new(statuses.into()),
                polls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SettlementChain for ScriptedChain {
        fn validate_address(&self, address: &str) -> crate::Result<()> {
            if address.starts_with("wallet") {
                Ok(())
            } else {
                Err(ChainError::InvalidAddress(address.to_string()))
            }
        }

        async fn submit_transfer(&self, _recipient: &str, units: u64) -> crate::Result<TxReference> {
            tokio::time::sleep(self.submit_delay).await;
            if self.submit_fails {
                return Err(ChainError::Rpc("node unavailable".to_string()));
            }
            Ok(TxReference::new(format!("sig-{units}")))
        }

        async fn signature_status(&self, _tx: &TxReference) -> crate::Result<SignatureStatus> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                match statuses.front() {
                    Some(Ok(status)) => Ok(status.clone()),
                    _ => Ok(SignatureStatus::Pending),
                }
            }
        }
    }

    fn settlement(chain: Arc<ScriptedChain>) -> Settlement<ScriptedChain> {
        Settlement::new(chain)
            .with_submission_timeout(Duration::from_secs(3))
            .with_confirmation_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_after_pending_polls() {
        let chain = ScriptedChain::new(vec![
            Ok(SignatureStatus::Pending),
            Err(ChainError::Rpc("flaky".to_string())),
            Ok(SignatureStatus::Confirmed),
        ]);
        let receipt = settlement(Arc::clone(&chain)).transfer("wallet-1", 42).await.unwrap();

        assert_eq!(receipt.tx.as_str(), "sig-42");
        assert_eq!(chain.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_carries_tx() {
        let chain = ScriptedChain::new(vec![Ok(SignatureStatus::Rejected("custom error".into()))]);
        let err = settlement(chain).transfer("wallet-1", 7).await.unwrap_err();

        assert_eq!(
            err,
            TransferError::Rejected {
                tx: TxReference::new("sig-7"),
                reason: "custom error".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_confirmed() {
        let chain = ScriptedChain::new(vec![Ok(SignatureStatus::Pending)]);
        let started = Instant::now();
        let err = settlement(chain).transfer("wallet-1", 7).await.unwrap_err();

        assert!(matches!(err, TransferError::ConfirmationTimeout { .. }));
        assert_eq!(err.tx(), Some(&TxReference::new("sig-7")));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_address_fails_before_submission() {
        let chain = ScriptedChain::new(vec![Ok(SignatureStatus::Confirmed)]);
        let err = settlement(Arc::clone(&chain)).transfer("garbage", 7).await.unwrap_err();

        assert!(matches!(err, TransferError::InvalidAddress(_)));
        assert_eq!(err.tx(), None);
        assert_eq!(chain.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_failure_has_no_tx() {
        let chain = Arc::new(ScriptedChain {
            submit_fails: true,
            submit_delay: Duration::ZERO,
            statuses: Mutex::new(VecDeque::new()),
            polls: AtomicUsize::new(0),
        });
        let err = settlement(chain).submit("wallet-1", 7).await.unwrap_err();
        assert!(matches!(err, TransferError::Submission(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_submission_is_cut_at_the_timeout() {
        let chain = Arc::new(ScriptedChain {
            submit_fails: false,
            submit_delay: Duration::from_secs(10),
            statuses: Mutex::new(VecDeque::new()),
            polls: AtomicUsize::new(0),
        });
        let started = Instant::now();
        let err = settlement(chain).submit("wallet-1", 7).await.unwrap_err();

        assert!(matches!(err, TransferError::Submission(_)));
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn max_transfer_duration_adds_both_phases() {
        let chain = ScriptedChain::new(vec![]);
        assert_eq!(
            settlement(chain).max_transfer_duration(),
            Duration::from_secs(8)
        );
    }
}
