//! Redemption Service - points-for-tokens redemption API
//!
//! This is the main entry point for the redemption service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redemption_chain::SolanaChain;
use redemption_service::{create_router, spawn_reconciler, AppState, ServiceConfig};
use redemption_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,redemption=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Redemption Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();
    config.validate()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        solana_rpc = %config.solana_rpc,
        token_mint = ?config.token_mint,
        treasury_configured = %config.treasury_key.is_some(),
        reconcile_interval_seconds = config.reconcile_interval_seconds,
        "Service configuration loaded"
    );

    // Settlement chain
    if config.token_mint.is_none() {
        return Err("TOKEN_MINT must be set".into());
    }
    let treasury = config
        .treasury_key
        .clone()
        .ok_or("treasury key not found (.secrets/treasury.json or TREASURY_KEY_JSON)")?;
    let chain = SolanaChain::new(&config.chain_config(), &treasury)?;
    tracing::info!(treasury = %chain.treasury_pubkey(), "Settlement chain configured");

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    // Build app state
    let state = AppState::new(store, Arc::new(chain), config.clone());

    if config.reconcile_interval_seconds > 0 {
        spawn_reconciler(
            state.redeemer.clone(),
            Duration::from_secs(config.reconcile_interval_seconds),
            config.stale_pending_after(),
        );
        tracing::info!("Background reconciler started");
    }

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
