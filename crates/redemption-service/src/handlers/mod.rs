//! API handlers.

pub mod admin;
pub mod health;
pub mod items;
pub mod redeem;
pub mod redemptions;
pub mod users;

use serde::Deserialize;

use redemption_core::{ItemId, UserId};

use crate::error::ApiError;

/// An item id as sent by clients: a string or a non-negative integer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemIdInput {
    /// `"sword-01"` or `"7"`.
    Text(String),
    /// `7`.
    Number(u64),
}

impl ItemIdInput {
    /// Validate into an [`ItemId`].
    pub fn parse(self) -> Result<ItemId, ApiError> {
        match self {
            Self::Text(s) => s
                .parse()
                .map_err(|_| ApiError::BadRequest("invalid item_id".into())),
            Self::Number(n) => Ok(ItemId::from(n)),
        }
    }
}

/// Parse a user id taken from the request path.
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("invalid user_id".into()))
}
