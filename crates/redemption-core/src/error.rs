//! Error taxonomy of the redemption workflow.

use crate::amount::AmountError;
use crate::ids::IdError;

/// Result type for redemption operations.
pub type Result<T> = std::result::Result<T, RedemptionError>;

/// Errors a redemption can end with.
///
/// Only the `Display` text of these variants ever reaches callers; storage
/// and chain detail is logged where it happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedemptionError {
    /// Bad or missing input, correctable by the caller.
    #[error("{0}")]
    Validation(String),

    /// Unknown user or item.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("user", "item", "redemption").
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The user's balance cannot cover the item.
    #[error("insufficient points: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance.
        balance: i64,
        /// Points required.
        required: i64,
    },

    /// The user already owns the item.
    #[error("item already owned")]
    AlreadyOwned,

    /// A catalog value is unusable (non-positive or out of range).
    #[error("invalid catalog data: {0}")]
    InvalidCatalogData(String),

    /// The ledger or record store is unavailable.
    #[error("storage error: {0}")]
    Storage(String),

    /// The transfer could not be submitted or was rejected; points refunded.
    #[error("transfer failed, points refunded: {0}")]
    ChainSubmission(String),

    /// The transfer was not confirmed in time; points refunded.
    #[error("transfer not confirmed in time, points refunded")]
    ChainConfirmationTimeout,

    /// Compensation failed; a human has to resolve the attempt.
    #[error("transfer failed and refund failed: manual review required")]
    ManualReviewRequired,

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl RedemptionError {
    /// Machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidId(_) => "invalid_request",
            Self::NotFound { .. } => "not_found",
            Self::InsufficientFunds { .. } => "insufficient_points",
            Self::AlreadyOwned => "already_owned",
            Self::InvalidCatalogData(_) => "invalid_catalog_data",
            Self::Storage(_) => "internal_error",
            Self::ChainSubmission(_) | Self::ChainConfirmationTimeout => "transfer_failed",
            Self::ManualReviewRequired => "manual_review",
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<AmountError> for RedemptionError {
    fn from(err: AmountError) -> Self {
        Self::InvalidCatalogData(err.to_string())
    }
}
