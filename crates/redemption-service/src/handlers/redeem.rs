//! The redeem endpoint.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use redemption_core::IdempotencyKey;

use crate::error::ApiError;
use crate::handlers::redemptions::RedemptionView;
use crate::handlers::ItemIdInput;
use crate::redemption::{RedeemRequest, RedemptionOutcome};
use crate::state::AppState;

const MISSING_PARAMETERS: &str = "missing parameters (user_id, item_id, user_wallet required)";

/// Redeem request body.
#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    /// The redeeming user.
    pub user_id: Option<String>,
    /// The catalog item.
    pub item_id: Option<ItemIdInput>,
    /// Recipient wallet address.
    pub user_wallet: Option<String>,
    /// Key making retries of this request one redemption.
    pub idempotency_key: Option<String>,
}

impl RedeemBody {
    fn into_request(self) -> Result<RedeemRequest, ApiError> {
        let missing = || ApiError::BadRequest(MISSING_PARAMETERS.into());

        let user_id = self
            .user_id
            .filter(|s| !s.is_empty())
            .ok_or_else(missing)?;
        let item_id = self.item_id.ok_or_else(missing)?;
        let wallet = self
            .user_wallet
            .filter(|s| !s.is_empty())
            .ok_or_else(missing)?;

        let idempotency_key = self
            .idempotency_key
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<IdempotencyKey>())
            .transpose()
            .map_err(|_| ApiError::BadRequest("invalid idempotency_key".into()))?;

        Ok(RedeemRequest {
            user_id: super::parse_user_id(&user_id)?,
            item_id: item_id.parse()?,
            wallet,
            idempotency_key,
        })
    }
}

/// Redeem response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RedeemResponse {
    /// The transfer confirmed.
    Completed {
        /// Always `true`.
        success: bool,
        /// Confirmed transaction.
        tx: String,
        /// Redemption record id.
        pending_id: String,
    },
    /// Stored state of an earlier request with the same key.
    Replayed {
        /// The record.
        result: RedemptionView,
    },
}

impl From<RedemptionOutcome> for RedeemResponse {
    fn from(outcome: RedemptionOutcome) -> Self {
        match outcome {
            RedemptionOutcome::Completed { redemption_id, tx } => Self::Completed {
                success: true,
                tx,
                pending_id: redemption_id.to_string(),
            },
            RedemptionOutcome::Replayed(record) => Self::Replayed {
                result: RedemptionView::from(&record),
            },
        }
    }
}

/// Redeem an item for points, paid out on-chain.
///
/// The saga runs on its own task: once points are deducted it finishes even
/// if the client disconnects.
pub async fn redeem(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RedeemBody>, JsonRejection>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = body.into_request()?;

    let redeemer = state.redeemer.clone();
    let outcome = tokio::spawn(async move { redeemer.redeem(request).await })
        .await
        .map_err(|e| ApiError::Internal(format!("redemption task failed: {e}")))??;

    Ok(Json(RedeemResponse::from(outcome)))
}

/// Any method other than POST on the redeem route.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
