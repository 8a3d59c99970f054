//! Redemption orchestration.

mod orchestrator;
mod outcome;
mod reconcile;

pub use orchestrator::{RedeemRequest, Redeemer, RedemptionPolicy};
pub use outcome::RedemptionOutcome;
pub use reconcile::{spawn_reconciler, ReconcileReport};
