//! Point balance accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A user's points account.
///
/// The balance is only ever mutated through the ledger store's atomic
/// grant/deduct/refund operations, and is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The user ID (from the identity provider).
    pub user_id: UserId,

    /// Current spendable points.
    pub points_balance: i64,

    /// Lifetime points granted to the user.
    pub lifetime_earned: i64,

    /// Lifetime points spent on redemptions, net of refunds.
    pub lifetime_redeemed: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            points_balance: 0,
            lifetime_earned: 0,
            lifetime_redeemed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a deduction.
    #[must_use]
    pub fn has_sufficient_points(&self, amount: i64) -> bool {
        self.points_balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_is_empty() {
        let account = Account::new(UserId::generate());
        assert_eq!(account.points_balance, 0);
        assert!(account.has_sufficient_points(0));
        assert!(!account.has_sufficient_points(1));
    }
}
