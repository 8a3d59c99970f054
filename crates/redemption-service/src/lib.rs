//! Points redemption HTTP API service.
//!
//! Users spend points for catalog items that pay out settlement tokens to
//! their wallet. This crate provides:
//!
//! - [`Redeemer`]: the saga deducting points, transferring tokens and
//!   refunding on failure, with idempotency-key replay
//! - the reconciler resolving records left `pending` by a crash
//! - the HTTP API over both, plus catalog and ledger administration
//!
//! # Authentication
//!
//! User identity is resolved upstream and passed explicitly. Admin endpoints
//! require the service API key in `x-api-key`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Store-backed handlers are sync underneath

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod redemption;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ServiceConfig};
pub use error::ApiError;
pub use redemption::{
    spawn_reconciler, ReconcileReport, RedeemRequest, Redeemer, RedemptionOutcome,
    RedemptionPolicy,
};
pub use routes::create_router;
pub use state::AppState;
