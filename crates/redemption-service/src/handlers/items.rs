//! Catalog handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use redemption_core::Item;

use crate::error::ApiError;
use crate::state::AppState;

/// Catalog response.
#[derive(Debug, Serialize)]
pub struct ListItemsResponse {
    /// Items, oldest first.
    pub items: Vec<Item>,
}

/// List the redeemable catalog.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListItemsResponse>, ApiError> {
    let items = state.store.list_items()?;
    Ok(Json(ListItemsResponse { items }))
}
