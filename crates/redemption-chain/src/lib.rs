//! On-chain settlement for point redemptions.
//!
//! This crate wraps the token-transfer primitive behind the [`SettlementChain`]
//! trait and provides:
//!
//! - [`SolanaChain`]: SPL-token transfers from a treasury wallet over Solana RPC
//! - [`Settlement`]: address validation, submission and bounded confirmation
//!   polling over any chain
//!
//! A transfer is either *submitted* (the node accepted it, outcome unknown) or
//! *confirmed*. The two are never conflated: [`Settlement::submit`] returns as
//! soon as a transaction reference exists, so callers can persist it before
//! waiting on [`Settlement::await_confirmation`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use redemption_chain::{ChainConfig, Settlement, SolanaChain, TreasuryKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChainConfig::new().with_mint("So11111111111111111111111111111111111111112");
//! let key = TreasuryKey::from_json(&std::fs::read_to_string(".secrets/treasury.json")?)?;
//! let settlement = Settlement::new(Arc::new(SolanaChain::new(&config, &key)?));
//!
//! let receipt = settlement
//!     .transfer("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin", 2_000_000)
//!     .await?;
//! println!("confirmed: {}", receipt.tx);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod error;
mod settlement;
pub mod solana;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use config::{ChainConfig, TreasuryKey, DEVNET_RPC, SUBMISSION_RPC_CALLS};
pub use error::{ChainError, Result, TransferError};
pub use settlement::{Settlement, TransferReceipt};
pub use solana::SolanaChain;

/// Reference to a submitted transaction (a base58 signature on Solana).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxReference(String);

impl TxReference {
    /// Wrap a transaction reference.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Return the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxReference({})", self.0)
    }
}

impl fmt::Display for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the chain currently knows about a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet seen, or seen but below the required commitment.
    Pending,
    /// Confirmed at the required commitment.
    Confirmed,
    /// Executed with an error; it will never succeed.
    Rejected(String),
}

/// A ledger that can pay out settlement tokens from the treasury.
#[async_trait]
pub trait SettlementChain: Send + Sync {
    /// Check that `address` can receive a transfer. Makes no network calls.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::InvalidAddress` if it cannot.
    fn validate_address(&self, address: &str) -> Result<()>;

    /// Build, sign and broadcast a transfer of `units` smallest units.
    ///
    /// Returns once the node accepted the transaction; it may still fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction could not be built or broadcast.
    async fn submit_transfer(&self, recipient: &str, units: u64) -> Result<TxReference>;

    /// Query the status of a submitted transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the node could not be queried.
    async fn signature_status(&self, tx: &TxReference) -> Result<SignatureStatus>;
}
