//! Ownership records (the user's redeemed-item collection).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemId, RedemptionId, UserId};

/// An item a user acquired through a confirmed redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    /// Owner.
    pub user_id: UserId,
    /// Owned item.
    pub item_id: ItemId,
    /// The redemption that paid for it.
    pub redemption_id: RedemptionId,
    /// When the transfer was confirmed.
    pub acquired_at: DateTime<Utc>,
}

impl OwnershipRecord {
    /// Create an ownership record stamped now.
    #[must_use]
    pub fn new(user_id: UserId, item_id: ItemId, redemption_id: RedemptionId) -> Self {
        Self {
            user_id,
            item_id,
            redemption_id,
            acquired_at: Utc::now(),
        }
    }
}
