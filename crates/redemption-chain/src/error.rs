//! Error types for chain settlement.

use crate::TxReference;

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors from a single chain call.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The address is not a valid recipient.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The treasury keypair could not be loaded.
    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),

    /// Configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The RPC node returned an error or could not be reached.
    #[error("RPC error: {0}")]
    Rpc(String),
}

/// Why a settlement transfer did not complete.
///
/// Variants produced after broadcast carry the transaction reference so the
/// caller can record it for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The recipient was rejected before anything was submitted.
    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),

    /// The transaction could not be submitted.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The chain rejected the transaction.
    #[error("transaction {tx} rejected: {reason}")]
    Rejected {
        /// The rejected transaction.
        tx: TxReference,
        /// Reason reported by the chain.
        reason: String,
    },

    /// The transaction was not confirmed before the deadline.
    #[error("transaction {tx} not confirmed in time")]
    ConfirmationTimeout {
        /// The unconfirmed transaction.
        tx: TxReference,
    },
}

impl TransferError {
    /// Transaction reference, if the transfer was broadcast.
    #[must_use]
    pub fn tx(&self) -> Option<&TxReference> {
        match self {
            Self::Rejected { tx, .. } | Self::ConfirmationTimeout { tx } => Some(tx),
            Self::InvalidAddress(_) | Self::Submission(_) => None,
        }
    }
}
