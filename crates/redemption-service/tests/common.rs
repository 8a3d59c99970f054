//! Common test utilities for redemption integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use redemption_chain::{ChainError, SettlementChain, SignatureStatus, TxReference};
use redemption_core::{
    Account, DeductionState, FailureKind, IdempotencyKey, Item, ItemId, LedgerEntry,
    OwnershipRecord, RedemptionRecord, UserId,
};
use redemption_service::{create_router, AppState, Redeemer, ServiceConfig};
use redemption_store::{RocksStore, Store, StoreError};

/// A valid Solana wallet address.
pub const WALLET: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

/// How the fake chain answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    /// Transfers confirm after a few pending polls.
    Confirm,
    /// The node refuses every transaction.
    FailSubmission,
    /// Transactions land with an error.
    Reject,
    /// Transactions are never seen.
    NeverConfirm,
}

/// In-memory settlement chain with scripted behavior.
pub struct FakeChain {
    mode: Mutex<ChainMode>,
    pending_polls: AtomicUsize,
    polls: Mutex<HashMap<String, usize>>,
    submissions: AtomicUsize,
    submit_delay: Mutex<Duration>,
}

impl FakeChain {
    pub fn new(mode: ChainMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            pending_polls: AtomicUsize::new(2),
            polls: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
            submit_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_mode(&self, mode: ChainMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Number of `Pending` answers before a transfer confirms.
    pub fn set_pending_polls(&self, polls: usize) {
        self.pending_polls.store(polls, Ordering::SeqCst);
    }

    /// How long the node takes to accept a transfer.
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// Transfers accepted by the node so far.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn mode(&self) -> ChainMode {
        *self.mode.lock().unwrap()
    }
}

#[async_trait]
impl SettlementChain for FakeChain {
    fn validate_address(&self, address: &str) -> redemption_chain::Result<()> {
        let valid = (32..=44).contains(&address.len())
            && address.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            Ok(())
        } else {
            Err(ChainError::InvalidAddress(address.to_string()))
        }
    }

    async fn submit_transfer(
        &self,
        _recipient: &str,
        units: u64,
    ) -> redemption_chain::Result<TxReference> {
        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.mode() == ChainMode::FailSubmission {
            return Err(ChainError::Rpc("node unavailable".to_string()));
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TxReference::new(format!("sig{n}x{units}")))
    }

    async fn signature_status(
        &self,
        tx: &TxReference,
    ) -> redemption_chain::Result<SignatureStatus> {
        let polls = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(tx.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let status = match self.mode() {
            ChainMode::Confirm if polls > self.pending_polls.load(Ordering::SeqCst) => {
                SignatureStatus::Confirmed
            }
            ChainMode::Reject => SignatureStatus::Rejected("custom program error: 0x1".into()),
            _ => SignatureStatus::Pending,
        };
        Ok(status)
    }
}

/// Store wrapper that can be told to fail specific operations.
pub struct FaultyStore {
    inner: RocksStore,
    pub fail_refunds: AtomicBool,
    pub fail_insert_pending: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: RocksStore) -> Self {
        Self {
            inner,
            fail_refunds: AtomicBool::new(false),
            fail_insert_pending: AtomicBool::new(false),
        }
    }
}

fn injected() -> StoreError {
    StoreError::Database("injected failure".to_string())
}

impl Store for FaultyStore {
    fn create_account(&self, account: &Account) -> redemption_store::Result<()> {
        self.inner.create_account(account)
    }

    fn get_account(&self, user_id: &UserId) -> redemption_store::Result<Option<Account>> {
        self.inner.get_account(user_id)
    }

    fn grant_points(
        &self,
        user_id: &UserId,
        amount: i64,
        reference: &str,
        description: &str,
    ) -> redemption_store::Result<i64> {
        self.inner.grant_points(user_id, amount, reference, description)
    }

    fn deduct(&self, user_id: &UserId, amount: i64, reference: &str) -> redemption_store::Result<i64> {
        self.inner.deduct(user_id, amount, reference)
    }

    fn refund(&self, user_id: &UserId, amount: i64, reference: &str) -> redemption_store::Result<i64> {
        if self.fail_refunds.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.refund(user_id, amount, reference)
    }

    fn deduction_state(&self, reference: &str) -> redemption_store::Result<Option<DeductionState>> {
        self.inner.deduction_state(reference)
    }

    fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> redemption_store::Result<Vec<LedgerEntry>> {
        self.inner.list_ledger_entries(user_id, limit, offset)
    }

    fn put_item(&self, item: &Item) -> redemption_store::Result<()> {
        self.inner.put_item(item)
    }

    fn get_item(&self, item_id: &ItemId) -> redemption_store::Result<Option<Item>> {
        self.inner.get_item(item_id)
    }

    fn list_items(&self) -> redemption_store::Result<Vec<Item>> {
        self.inner.list_items()
    }

    fn get_redemption(
        &self,
        key: &IdempotencyKey,
    ) -> redemption_store::Result<Option<RedemptionRecord>> {
        self.inner.get_redemption(key)
    }

    fn insert_pending(&self, record: &RedemptionRecord) -> redemption_store::Result<()> {
        if self.fail_insert_pending.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_pending(record)
    }

    fn mark_submitted(
        &self,
        key: &IdempotencyKey,
        tx: &str,
    ) -> redemption_store::Result<RedemptionRecord> {
        self.inner.mark_submitted(key, tx)
    }

    fn mark_success(
        &self,
        key: &IdempotencyKey,
        tx: &str,
    ) -> redemption_store::Result<RedemptionRecord> {
        self.inner.mark_success(key, tx)
    }

    fn mark_failed(
        &self,
        key: &IdempotencyKey,
        kind: FailureKind,
        reason: &str,
    ) -> redemption_store::Result<RedemptionRecord> {
        self.inner.mark_failed(key, kind, reason)
    }

    fn flag_manual_review(
        &self,
        key: &IdempotencyKey,
        reason: &str,
    ) -> redemption_store::Result<RedemptionRecord> {
        self.inner.flag_manual_review(key, reason)
    }

    fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> redemption_store::Result<Vec<RedemptionRecord>> {
        self.inner.list_pending_older_than(cutoff)
    }

    fn list_manual_review(&self) -> redemption_store::Result<Vec<RedemptionRecord>> {
        self.inner.list_manual_review()
    }

    fn add_ownership(&self, record: &OwnershipRecord) -> redemption_store::Result<()> {
        self.inner.add_ownership(record)
    }

    fn list_ownership(&self, user_id: &UserId) -> redemption_store::Result<Vec<OwnershipRecord>> {
        self.inner.list_ownership(user_id)
    }

    fn owns_item(&self, user_id: &UserId, item_id: &ItemId) -> redemption_store::Result<bool> {
        self.inner.owns_item(user_id, item_id)
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// Direct access to the store, for seeding and assertions.
    pub store: Arc<FaultyStore>,
    /// The fake settlement chain.
    pub chain: Arc<FakeChain>,
    /// The orchestrator behind the server.
    pub redeemer: Redeemer,
    /// The service API key for admin requests.
    pub service_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database and a confirming chain.
    pub fn new() -> Self {
        Self::with_mode(ChainMode::Confirm)
    }

    /// Create a harness whose chain behaves as `mode`.
    pub fn with_mode(mode: ChainMode) -> Self {
        Self::with_config(mode, |_| {})
    }

    /// Create a harness with the test config adjusted by `configure`.
    pub fn with_config(mode: ChainMode, configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");
        let store = Arc::new(FaultyStore::new(store));
        let chain = Arc::new(FakeChain::new(mode));

        let service_api_key = "test-service-key".to_string();
        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            confirmation_timeout_seconds: 1,
            confirmation_poll_ms: 10,
            refund_max_attempts: 3,
            refund_retry_base_ms: 1,
            ..ServiceConfig::default()
        };
        configure(&mut config);

        let state = AppState::new(store.clone(), chain.clone(), config);
        let redeemer = state.redeemer.clone();
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            _temp_dir: temp_dir,
            store,
            chain,
            redeemer,
            service_api_key,
        }
    }

    /// The admin API key header.
    pub fn api_key_header(&self) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(&self.service_api_key).unwrap(),
        )
    }

    /// Create an account holding `points`.
    pub fn seed_user(&self, points: i64) -> UserId {
        let user_id = UserId::generate();
        self.store.create_account(&Account::new(user_id)).unwrap();
        if points > 0 {
            self.store
                .grant_points(&user_id, points, &format!("seed-{user_id}"), "Seed")
                .unwrap();
        }
        user_id
    }

    /// Add a catalog item.
    pub fn seed_item(&self, id: &str, cost_points: i64, worth: Decimal) -> ItemId {
        let item_id: ItemId = id.parse().unwrap();
        self.store
            .put_item(&Item::new(
                item_id.clone(),
                format!("Item {id}"),
                Decimal::from(cost_points),
                worth,
            ))
            .unwrap();
        item_id
    }

    /// Current points balance.
    pub fn balance(&self, user_id: &UserId) -> i64 {
        self.store
            .get_account(user_id)
            .unwrap()
            .expect("account exists")
            .points_balance
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
