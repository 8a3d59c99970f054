//! Error types for redemption storage.

use redemption_core::TransitionError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A transaction could not acquire its locks in time.
    #[error("lock conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// The key that was looked up.
        id: String,
    },

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Entity kind.
        entity: &'static str,
        /// The conflicting key.
        id: String,
    },

    /// Insufficient points for a deduction.
    #[error("insufficient points: balance={balance}, required={required}")]
    InsufficientPoints {
        /// Current balance.
        balance: i64,
        /// Points required.
        required: i64,
    },

    /// Amount must be positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// A live balance change is already journaled under this reference.
    #[error("duplicate ledger reference: {reference}")]
    DuplicateReference {
        /// The reference.
        reference: String,
    },

    /// A refund does not match the deduction journaled under its reference.
    #[error("ledger reference mismatch: {reference}")]
    ReferenceMismatch {
        /// The reference.
        reference: String,
    },

    /// A redemption record with this idempotency key already exists.
    #[error("duplicate idempotency key: {key}")]
    DuplicateKey {
        /// The idempotency key.
        key: String,
    },

    /// Invalid redemption status transition.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TimedOut | rocksdb::ErrorKind::TryAgain => {
                Self::Conflict(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}
