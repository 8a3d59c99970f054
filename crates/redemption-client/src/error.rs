//! Client error types.

/// Result type for client calls.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that keep a redemption call from reaching an outcome.
///
/// Business failures (insufficient points, refunded transfers) are not errors
/// here; they come back as [`crate::RedeemOutcome::Rejected`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response that is not a redemption outcome.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether resending the same request (same key) may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Api { status, .. } => *status >= 500,
            Self::Serialization(_) | Self::Configuration(_) => false,
        }
    }
}
