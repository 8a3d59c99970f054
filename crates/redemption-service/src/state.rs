//! Application state.

use std::sync::Arc;

use redemption_chain::{Settlement, SettlementChain};
use redemption_store::Store;

use crate::config::ServiceConfig;
use crate::redemption::Redeemer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// The redemption orchestrator.
    pub redeemer: Redeemer,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn SettlementChain>,
        config: ServiceConfig,
    ) -> Self {
        let settlement = Settlement::new(chain)
            .with_submission_timeout(config.submission_timeout())
            .with_confirmation_timeout(config.confirmation_timeout())
            .with_poll_interval(config.confirmation_poll_interval());
        let redeemer = Redeemer::new(
            Arc::clone(&store),
            settlement,
            config.redemption_policy(),
        );

        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not set - admin endpoints are disabled");
        }

        Self {
            store,
            config,
            redeemer,
        }
    }
}
