//! Catalog items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{floor_points, AmountError};
use crate::ItemId;

/// A redeemable catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Catalog identifier.
    pub item_id: ItemId,

    /// Display name.
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,

    /// Optional image shown in the store.
    #[serde(default)]
    pub image_url: Option<String>,

    /// Price in points.
    pub cost_points: Decimal,

    /// Value paid out on-chain, in whole settlement tokens.
    pub worth: Decimal,

    /// When the item was added to the catalog.
    pub created_at: DateTime<Utc>,
}

/// Validated price snapshot of an item, taken once per redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPricing {
    /// Whole points to deduct (`floor(cost_points)`).
    pub cost_points: i64,

    /// Settlement amount in whole tokens.
    pub worth: Decimal,
}

impl Item {
    /// Create a new item.
    #[must_use]
    pub fn new(item_id: ItemId, name: impl Into<String>, cost_points: Decimal, worth: Decimal) -> Self {
        Self {
            item_id,
            name: name.into(),
            description: String::new(),
            image_url: None,
            cost_points,
            worth,
            created_at: Utc::now(),
        }
    }

    /// Snapshot and validate the item's price for a redemption.
    ///
    /// # Errors
    ///
    /// Returns an error if the cost or worth is not positive. A non-positive
    /// catalog value is a data-integrity problem, not a caller mistake.
    pub fn pricing(&self) -> Result<ItemPricing, AmountError> {
        let cost_points = floor_points(self.cost_points)?;
        if self.worth <= Decimal::ZERO {
            return Err(AmountError::NonPositive(self.worth));
        }
        Ok(ItemPricing {
            cost_points,
            worth: self.worth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_floors_cost() {
        let item = Item::new(
            ItemId::from(1),
            "Hoodie",
            Decimal::new(405, 1),
            Decimal::new(25, 1),
        );
        let pricing = item.pricing().unwrap();
        assert_eq!(pricing.cost_points, 40);
        assert_eq!(pricing.worth, Decimal::new(25, 1));
    }

    #[test]
    fn pricing_rejects_zero_worth() {
        let item = Item::new(ItemId::from(2), "Broken", Decimal::from(10), Decimal::ZERO);
        assert!(item.pricing().is_err());
    }
}
