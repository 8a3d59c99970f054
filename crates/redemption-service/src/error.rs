//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use redemption_core::RedemptionError;
use redemption_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Invalid input.
    #[error("{0}")]
    BadRequest(String),

    /// Resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// Wrong HTTP method for the route.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The request outlived the service's deadline. The key's outcome can
    /// still be fetched by retrying it or looking it up.
    #[error("request timed out")]
    Timeout,

    /// Business outcome the caller should show to the user. Served as 200.
    #[error("{message}")]
    Rejected {
        /// Machine-readable code.
        code: &'static str,
        /// User-facing message.
        message: String,
    },

    /// Failure with a safe, taxonomy-level message. Served as 500.
    #[error("{message}")]
    Failed {
        /// Machine-readable code.
        code: &'static str,
        /// User-facing message.
        message: String,
    },

    /// Internal server error; the detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "unauthorized".to_string(),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                "Method not allowed".to_string(),
            ),
            Self::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "request timed out".to_string(),
            ),
            Self::Rejected { code, message } => (StatusCode::OK, code, message),
            Self::Failed { code, message } => {
                (StatusCode::INTERNAL_SERVER_ERROR, code, message)
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

impl From<RedemptionError> for ApiError {
    fn from(err: RedemptionError) -> Self {
        let code = err.code();
        match err {
            RedemptionError::Validation(_) | RedemptionError::InvalidId(_) => {
                Self::BadRequest(err.to_string())
            }
            RedemptionError::NotFound { entity, .. } => Self::NotFound(format!("{entity} not found")),
            RedemptionError::InsufficientFunds { .. } => Self::Rejected {
                code,
                message: "insufficient points".to_string(),
            },
            RedemptionError::AlreadyOwned
            | RedemptionError::ChainSubmission(_)
            | RedemptionError::ChainConfirmationTimeout => Self::Rejected {
                code,
                message: err.to_string(),
            },
            RedemptionError::InvalidCatalogData(detail) => {
                tracing::error!(error = %detail, "Catalog item cannot be redeemed");
                Self::Failed {
                    code,
                    message: "item is not redeemable".to_string(),
                }
            }
            RedemptionError::ManualReviewRequired => Self::Failed {
                code,
                message: err.to_string(),
            },
            RedemptionError::Storage(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AlreadyExists { .. }
            | StoreError::DuplicateReference { .. }
            | StoreError::DuplicateKey { .. } => Self::Conflict(err.to_string()),
            StoreError::InsufficientPoints { .. } => Self::Rejected {
                code: "insufficient_points",
                message: "insufficient points".to_string(),
            },
            StoreError::InvalidAmount(_) | StoreError::ReferenceMismatch { .. } => {
                Self::BadRequest(err.to_string())
            }
            StoreError::Database(_)
            | StoreError::Conflict(_)
            | StoreError::Serialization(_)
            | StoreError::InvalidTransition(_) => Self::Internal(err.to_string()),
        }
    }
}
