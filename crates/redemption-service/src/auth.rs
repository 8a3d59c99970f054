//! Admin authentication.
//!
//! Admin endpoints are called by trusted back-office services and present the
//! configured service key in the `x-api-key` header.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// A request authenticated with the service API key.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAuth;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        // No key configured means admin access is disabled.
        let expected_key = state
            .config
            .service_api_key
            .as_deref()
            .ok_or(ApiError::Unauthorized)?;

        if api_key != expected_key {
            tracing::warn!("Rejected admin request with invalid API key");
            return Err(ApiError::Unauthorized);
        }

        Ok(ServiceAuth)
    }
}
