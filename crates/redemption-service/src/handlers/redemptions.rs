//! Redemption status lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use redemption_core::{IdempotencyKey, RedemptionRecord, RedemptionStatus};

use crate::error::ApiError;
use crate::state::AppState;

/// Public view of a redemption record.
#[derive(Debug, Serialize)]
pub struct RedemptionView {
    /// Record id (the `pending_id` of the original response).
    pub id: String,
    /// Current status.
    pub status: RedemptionStatus,
    /// Chain transaction, once submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Why the redemption failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<&RedemptionRecord> for RedemptionView {
    fn from(record: &RedemptionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            status: record.status,
            tx_hash: record.tx_reference.clone(),
            failure_reason: record.failure_reason.clone(),
        }
    }
}

/// Envelope of a replayed or looked-up record.
#[derive(Debug, Serialize)]
pub struct RedemptionResult {
    /// The record.
    pub result: RedemptionView,
}

/// Look up a redemption by idempotency key.
pub async fn get_redemption(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<RedemptionResult>, ApiError> {
    let key: IdempotencyKey = key
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid idempotency_key".into()))?;

    let record = state
        .store
        .get_redemption(&key)?
        .ok_or_else(|| ApiError::NotFound("redemption not found".into()))?;

    Ok(Json(RedemptionResult {
        result: RedemptionView::from(&record),
    }))
}
