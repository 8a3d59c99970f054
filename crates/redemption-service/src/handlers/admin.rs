//! Back-office handlers, authenticated with the service API key.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use redemption_core::{Account, Item, RedemptionRecord};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::users::BalanceResponse;
use crate::handlers::{parse_user_id, ItemIdInput};
use crate::redemption::ReconcileReport;
use crate::state::AppState;

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// User ID issued by the identity provider.
    pub user_id: String,
}

/// Create a points account.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let account = Account::new(user_id);
    state.store.create_account(&account)?;

    tracing::info!(user_id = %user_id, "Account created");
    Ok(Json(BalanceResponse::from(&account)))
}

/// Grant points request.
#[derive(Debug, Deserialize)]
pub struct GrantPointsRequest {
    /// The user to credit.
    pub user_id: String,
    /// Points to add.
    pub amount: i64,
    /// Caller's unique reference; a repeated reference is rejected.
    pub reference: String,
    /// Ledger description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Grant points earned elsewhere.
pub async fn grant_points(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<GrantPointsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    if body.reference.is_empty() {
        return Err(ApiError::BadRequest("reference is required".into()));
    }
    let description = body.description.as_deref().unwrap_or("Points granted");

    let balance = state
        .store
        .grant_points(&user_id, body.amount, &body.reference, description)?;

    tracing::info!(
        user_id = %user_id,
        amount = body.amount,
        reference = %body.reference,
        new_balance = balance,
        "Points granted"
    );

    Ok(Json(serde_json::json!({
        "user_id": user_id.to_string(),
        "points_balance": balance
    })))
}

/// Upsert item request.
#[derive(Debug, Deserialize)]
pub struct PutItemRequest {
    /// Catalog id.
    pub item_id: ItemIdInput,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Image URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Points price.
    pub cost_points: Decimal,
    /// Settlement tokens paid out.
    pub worth: Decimal,
}

/// Insert or replace a catalog item.
pub async fn put_item(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<PutItemRequest>,
) -> Result<Json<Item>, ApiError> {
    let item_id = body.item_id.parse()?;
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }

    let mut item = Item::new(item_id, body.name, body.cost_points, body.worth);
    item.description = body.description;
    item.image_url = body.image_url;
    item.pricing()
        .map_err(|e| ApiError::BadRequest(format!("item is not redeemable: {e}")))?;

    // Replacing an item keeps its catalog position.
    if let Some(existing) = state.store.get_item(&item.item_id)? {
        item.created_at = existing.created_at;
    }
    state.store.put_item(&item)?;

    tracing::info!(item_id = %item.item_id, cost_points = %item.cost_points, worth = %item.worth, "Catalog item saved");
    Ok(Json(item))
}

/// Manual review queue response.
#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    /// Records awaiting an operator.
    pub redemptions: Vec<RedemptionRecord>,
}

/// List redemptions flagged for manual review.
pub async fn list_manual_review(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
) -> Result<Json<ReviewResponse>, ApiError> {
    let redemptions = state.store.list_manual_review()?;
    Ok(Json(ReviewResponse { redemptions }))
}

/// Reconcile query parameters.
#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    /// Override of the staleness threshold.
    pub older_than_seconds: Option<u64>,
}

/// Run one reconciliation sweep of stale pending records.
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let older_than = query
        .older_than_seconds
        .map_or_else(|| state.config.stale_pending_after(), Duration::from_secs);

    let report = state.redeemer.reconcile_stale(older_than).await?;
    Ok(Json(report))
}
