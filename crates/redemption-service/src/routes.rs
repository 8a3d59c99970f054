//! Route definitions.

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::timeout::error::Elapsed;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::handlers::{admin, health, items, redeem, redemptions, users};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;
    let max_concurrent_requests = state.config.max_concurrent_requests;
    let state = Arc::new(state);

    Router::new()
        // Health
        .route("/health", get(health::health))
        // Redemption
        .route(
            "/v1/redeem",
            post(redeem::redeem).fallback(redeem::method_not_allowed),
        )
        .route("/v1/redemptions/:key", get(redemptions::get_redemption))
        // Catalog
        .route("/v1/items", get(items::list_items))
        // Users
        .route("/v1/users/:user_id/balance", get(users::get_balance))
        .route("/v1/users/:user_id/items", get(users::list_owned_items))
        .route("/v1/users/:user_id/ledger", get(users::list_ledger))
        // Admin (service auth)
        .route("/v1/admin/users", post(admin::create_user))
        .route("/v1/admin/points", post(admin::grant_points))
        .route("/v1/admin/items", post(admin::put_item))
        .route("/v1/admin/review", get(admin::list_manual_review))
        .route("/v1/admin/reconcile", post(admin::reconcile))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(Duration::from_secs(request_timeout_seconds)),
        )
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrent_requests))
        .with_state(state)
}

/// Turn a middleware failure into the JSON error body.
async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
