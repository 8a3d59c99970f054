//! Request and response types for the redemption client.

use serde::{Deserialize, Serialize};

use redemption_core::{IdempotencyKey, ItemId, RedemptionStatus, UserId};

/// One logical redemption attempt.
///
/// The key is fixed when the request is built; every retry of this value
/// sends the same key.
#[derive(Debug, Clone, Serialize)]
pub struct RedeemRequest {
    /// The redeeming user.
    pub user_id: UserId,
    /// The catalog item.
    pub item_id: ItemId,
    /// Recipient wallet address.
    pub user_wallet: String,
    /// Key collapsing retries into one redemption.
    pub idempotency_key: IdempotencyKey,
}

impl RedeemRequest {
    /// Build a request with a freshly generated idempotency key.
    #[must_use]
    pub fn new(user_id: UserId, item_id: ItemId, user_wallet: impl Into<String>) -> Self {
        Self::with_key(user_id, item_id, user_wallet, IdempotencyKey::generate())
    }

    /// Build a request that reuses an existing key.
    #[must_use]
    pub fn with_key(
        user_id: UserId,
        item_id: ItemId,
        user_wallet: impl Into<String>,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            user_id,
            item_id,
            user_wallet: user_wallet.into(),
            idempotency_key,
        }
    }
}

/// Stored state of a redemption, as returned for replays and status lookups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedemptionResult {
    /// Record id.
    pub id: String,
    /// Current status.
    pub status: RedemptionStatus,
    /// Chain transaction, once submitted.
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Why the redemption failed.
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Wire shape of a redeem response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RedeemResponse {
    Completed {
        #[allow(dead_code)]
        success: bool,
        tx: String,
        pending_id: String,
    },
    Replayed {
        result: RedemptionResult,
    },
    Error(ApiErrorResponse),
}

/// Error body returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Status lookup response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusResponse {
    pub result: RedemptionResult,
}

/// What a redemption attempt came to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// The transfer confirmed.
    Completed {
        /// Confirmed transaction.
        tx: String,
        /// Redemption record id.
        pending_id: String,
    },
    /// The key was seen before; this is its stored state.
    Replayed(RedemptionResult),
    /// The service refused or could not complete the redemption.
    Rejected {
        /// Which toast to show.
        kind: RejectionKind,
        /// Message from the service.
        message: String,
    },
}

impl RedeemOutcome {
    /// User-facing message for this outcome.
    #[must_use]
    pub fn toast(&self) -> String {
        match self {
            Self::Completed { .. } => "Redeemed! Your tokens are on the way.".to_string(),
            Self::Replayed(result) => match result.status {
                RedemptionStatus::Success => "You already redeemed this item.".to_string(),
                RedemptionStatus::Pending => "Your redemption is still processing.".to_string(),
                RedemptionStatus::Failed => {
                    "This redemption failed. Your points were refunded.".to_string()
                }
            },
            Self::Rejected { kind, message } => match kind {
                RejectionKind::InsufficientPoints => {
                    "You don't have enough points for this item.".to_string()
                }
                RejectionKind::ItemUnavailable => "This item is unavailable.".to_string(),
                RejectionKind::TransferRefunded => {
                    "Transfer failed. Your points were refunded.".to_string()
                }
                RejectionKind::ManualReview => {
                    "Something went wrong. Our team is reviewing your redemption.".to_string()
                }
                RejectionKind::InvalidRequest => format!("Could not redeem: {message}"),
            },
        }
    }

    /// Whether the outcome is final for this key.
    ///
    /// A replayed `pending` record may still resolve; poll
    /// [`crate::RedemptionClient::redemption_status`] for it.
    #[must_use]
    pub fn is_final(&self) -> bool {
        match self {
            Self::Replayed(result) => result.status.is_terminal(),
            Self::Completed { .. } | Self::Rejected { .. } => true,
        }
    }
}

/// Kind of failed redemption, one per distinct toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Balance below the item's cost.
    InsufficientPoints,
    /// Item missing, already owned or not redeemable.
    ItemUnavailable,
    /// The transfer failed and the points were returned.
    TransferRefunded,
    /// The refund failed; an operator will resolve it.
    ManualReview,
    /// The request itself was malformed.
    InvalidRequest,
}

impl RejectionKind {
    /// Classify a service error code. Unknown codes are not outcomes.
    #[must_use]
    pub fn from_code(code: &str, message: &str) -> Option<Self> {
        match code {
            "insufficient_points" => Some(Self::InsufficientPoints),
            "already_owned" | "invalid_catalog_data" => Some(Self::ItemUnavailable),
            "not_found" if message.starts_with("item") => Some(Self::ItemUnavailable),
            "not_found" | "invalid_request" => Some(Self::InvalidRequest),
            "transfer_failed" => Some(Self::TransferRefunded),
            "manual_review" => Some(Self::ManualReview),
            _ => None,
        }
    }
}
