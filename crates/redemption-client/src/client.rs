//! Redemption HTTP client implementation.

use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

use redemption_core::IdempotencyKey;

use crate::error::{ClientError, Result};
use crate::types::{
    ApiErrorResponse, RedeemOutcome, RedeemRequest, RedeemResponse, RejectionKind,
    StatusResponse,
};

/// Redemption API client.
#[derive(Debug, Clone)]
pub struct RedemptionClient {
    client: Client,
    base_url: Url,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl RedemptionClient {
    /// Create a new redemption client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the redemption service (e.g., `"http://redemption:8080"`)
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_options(base_url, ClientOptions::default())
    }

    /// Create a new redemption client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn with_options(base_url: &str, options: ClientOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Configuration(format!("invalid base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Configuration(format!(
                "invalid base url: {base_url}"
            )));
        }

        Ok(Self {
            client,
            base_url,
            max_attempts: options.max_attempts.max(1),
            retry_backoff: Duration::from_millis(options.retry_backoff_ms),
        })
    }

    /// Generate a key for a new redemption attempt.
    ///
    /// Call once per user click and keep it for every retry of that click.
    #[must_use]
    pub fn generate_idempotency_key() -> IdempotencyKey {
        IdempotencyKey::generate()
    }

    /// Redeem an item.
    ///
    /// Transport failures and 5xx responses are retried with the same key, up
    /// to the configured attempt count. Business failures come back as
    /// [`RedeemOutcome::Rejected`] and are never retried.
    ///
    /// # Errors
    ///
    /// Returns an error if every attempt failed without an outcome.
    pub async fn redeem(&self, request: &RedeemRequest) -> Result<RedeemOutcome> {
        let url = self.url(&["v1", "redeem"])?;
        let mut attempt = 1;

        loop {
            match self.post_redeem(url.clone(), request).await {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        key = %request.idempotency_key,
                        attempt,
                        error = %err,
                        "Redeem attempt failed, retrying with the same key"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Look up the stored state of a redemption.
    ///
    /// Returns `None` if the service has no record for the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn redemption_status(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<crate::RedemptionResult>> {
        let url = self.url(&["v1", "redemptions", key.as_str()])?;

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body: StatusResponse = response.json().await?;
        Ok(Some(body.result))
    }

    async fn post_redeem(&self, url: Url, request: &RedeemRequest) -> Result<RedeemOutcome> {
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let parsed: std::result::Result<RedeemResponse, _> = serde_json::from_slice(&body);
        match parsed {
            Ok(RedeemResponse::Completed { tx, pending_id, .. }) if status.is_success() => {
                Ok(RedeemOutcome::Completed { tx, pending_id })
            }
            Ok(RedeemResponse::Replayed { result }) if status.is_success() => {
                Ok(RedeemOutcome::Replayed(result))
            }
            Ok(RedeemResponse::Error(error)) => Self::classify(status, error),
            _ => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }

    /// Turn an error body into an outcome, or an error when it is not one.
    fn classify(status: StatusCode, error: ApiErrorResponse) -> Result<RedeemOutcome> {
        let code = error.code.unwrap_or_else(|| "unknown".to_string());
        match RejectionKind::from_code(&code, &error.error) {
            Some(kind) => Ok(RedeemOutcome::Rejected {
                kind,
                message: error.error,
            }),
            None => Err(ClientError::Api {
                code,
                message: error.error,
                status: status.as_u16(),
            }),
        }
    }

    async fn api_error(response: reqwest::Response) -> ClientError {
        let status = response.status();
        match response.json::<ApiErrorResponse>().await {
            Ok(body) => ClientError::Api {
                code: body.code.unwrap_or_else(|| "unknown".to_string()),
                message: body.error,
                status: status.as_u16(),
            },
            Err(_) => ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            },
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Configuration("invalid base url".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 120, above the service's own
    /// request deadline so the service answers first).
    pub timeout_seconds: u64,
    /// Attempts per redeem call, including the first (default: 3).
    pub max_attempts: u32,
    /// Base delay between attempts, grown linearly (default: 500ms).
    pub retry_backoff_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}
