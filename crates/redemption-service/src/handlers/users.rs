//! Per-user balance, ownership and ledger handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use redemption_core::{Account, LedgerEntry, OwnershipRecord};

use crate::error::ApiError;
use crate::handlers::parse_user_id;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// The user.
    pub user_id: String,
    /// Spendable points.
    pub points_balance: i64,
    /// Points ever granted.
    pub lifetime_earned: i64,
    /// Points spent on confirmed redemptions.
    pub lifetime_redeemed: i64,
}

impl From<&Account> for BalanceResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            points_balance: account.points_balance,
            lifetime_earned: account.lifetime_earned,
            lifetime_redeemed: account.lifetime_redeemed,
        }
    }
}

/// Get a user's points balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let account = state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(BalanceResponse::from(&account)))
}

/// Owned items response.
#[derive(Debug, Serialize)]
pub struct OwnedItemsResponse {
    /// Ownership records.
    pub items: Vec<OwnershipRecord>,
}

/// List the items a user owns.
pub async fn list_owned_items(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<OwnedItemsResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    let items = state.store.list_ownership(&user_id)?;
    Ok(Json(OwnedItemsResponse { items }))
}

/// Ledger query parameters.
#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    /// Maximum number of entries to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Ledger entry response.
#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    /// Entry ID.
    pub id: String,
    /// Signed amount (negative = deduction).
    pub amount: i64,
    /// Entry kind.
    pub kind: String,
    /// Balance after this entry.
    pub balance_after: i64,
    /// Idempotency key or grant reference.
    pub reference: String,
    /// Description.
    pub description: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerEntry> for LedgerEntryResponse {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            amount: entry.amount,
            kind: entry.kind.as_str().to_string(),
            balance_after: entry.balance_after,
            reference: entry.reference.clone(),
            description: entry.description.clone(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Ledger page response.
#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    /// Entries, newest first.
    pub entries: Vec<LedgerEntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List a user's ledger.
pub async fn list_ledger(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    state
        .store
        .get_account(&user_id)?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let entries = state
        .store
        .list_ledger_entries(&user_id, limit + 1, query.offset)?;

    let has_more = entries.len() > limit;
    let entries = entries
        .iter()
        .take(limit)
        .map(LedgerEntryResponse::from)
        .collect();

    Ok(Json(LedgerResponse { entries, has_more }))
}
