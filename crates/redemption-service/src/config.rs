//! Service configuration.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use redemption_chain::{ChainConfig, TreasuryKey, DEVNET_RPC};

use crate::redemption::RedemptionPolicy;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/redemption").
    pub data_dir: String,

    /// API key guarding the admin endpoints.
    pub service_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds. Must outlast a full redemption.
    pub request_timeout_seconds: u64,

    /// Maximum number of requests served at once.
    pub max_concurrent_requests: usize,

    /// Solana RPC endpoint (default: devnet).
    pub solana_rpc: String,

    /// Timeout of a single RPC request.
    pub rpc_timeout_seconds: u64,

    /// Mint of the settlement token.
    pub token_mint: Option<String>,

    /// Decimals of the settlement token.
    pub token_decimals: u8,

    /// Treasury keypair, from `.secrets/treasury.json` or `TREASURY_KEY_JSON`.
    pub treasury_key: Option<TreasuryKey>,

    /// How long a submitted transfer may take to confirm.
    pub confirmation_timeout_seconds: u64,

    /// Delay between confirmation polls.
    pub confirmation_poll_ms: u64,

    /// Refund attempts before a failed redemption is escalated.
    pub refund_max_attempts: u32,

    /// Backoff before the first refund retry; doubles per attempt.
    pub refund_retry_base_ms: u64,

    /// Age after which a pending record is considered abandoned.
    pub stale_pending_seconds: u64,

    /// Period of the background reconciler, 0 disables it.
    pub reconcile_interval_seconds: u64,
}

/// Invalid combination of settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The request timeout would cut redemptions short.
    #[error(
        "REQUEST_TIMEOUT_SECONDS ({request}s) must exceed the longest redemption ({redemption}s)"
    )]
    RequestTimeoutTooShort {
        /// Configured request timeout.
        request: u64,
        /// Worst-case redemption duration, rounded up.
        redemption: u64,
    },

    /// Pending records would be reconciled while their request is still running.
    #[error("STALE_PENDING_SECONDS ({stale}s) must exceed REQUEST_TIMEOUT_SECONDS ({request}s)")]
    StaleWindowTooShort {
        /// Configured staleness threshold.
        stale: u64,
        /// Configured request timeout.
        request: u64,
    },

    /// A setting that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            max_concurrent_requests: env_or(
                "MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            ),
            solana_rpc: std::env::var("SOLANA_RPC").unwrap_or(defaults.solana_rpc),
            rpc_timeout_seconds: env_or(
                "RPC_TIMEOUT_SECONDS",
                defaults.rpc_timeout_seconds,
            ),
            token_mint: std::env::var("TOKEN_MINT").ok(),
            token_decimals: env_or("TOKEN_DECIMALS", defaults.token_decimals),
            treasury_key: load_treasury_key(),
            confirmation_timeout_seconds: env_or(
                "CONFIRMATION_TIMEOUT_SECONDS",
                defaults.confirmation_timeout_seconds,
            ),
            confirmation_poll_ms: env_or("CONFIRMATION_POLL_MS", defaults.confirmation_poll_ms),
            refund_max_attempts: env_or("REFUND_MAX_ATTEMPTS", defaults.refund_max_attempts),
            refund_retry_base_ms: env_or("REFUND_RETRY_BASE_MS", defaults.refund_retry_base_ms),
            stale_pending_seconds: env_or(
                "STALE_PENDING_SECONDS",
                defaults.stale_pending_seconds,
            ),
            reconcile_interval_seconds: env_or(
                "RECONCILE_INTERVAL_SECONDS",
                defaults.reconcile_interval_seconds,
            ),
        }
    }

    /// Check settings that depend on each other.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirmation_timeout_seconds == 0 {
            return Err(ConfigError::Zero("CONFIRMATION_TIMEOUT_SECONDS"));
        }
        if self.rpc_timeout_seconds == 0 {
            return Err(ConfigError::Zero("RPC_TIMEOUT_SECONDS"));
        }
        if self.refund_max_attempts == 0 {
            return Err(ConfigError::Zero("REFUND_MAX_ATTEMPTS"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::Zero("MAX_CONCURRENT_REQUESTS"));
        }

        let policy = self.redemption_policy();
        let redemption = policy
            .join_window(self.max_transfer_duration())
            .as_secs()
            .saturating_add(1);
        if self.request_timeout_seconds <= redemption {
            return Err(ConfigError::RequestTimeoutTooShort {
                request: self.request_timeout_seconds,
                redemption,
            });
        }
        if self.stale_pending_seconds <= self.request_timeout_seconds {
            return Err(ConfigError::StaleWindowTooShort {
                stale: self.stale_pending_seconds,
                request: self.request_timeout_seconds,
            });
        }
        Ok(())
    }

    /// Confirmation timeout as a duration.
    #[must_use]
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_seconds)
    }

    /// Longest a transfer submission may take.
    #[must_use]
    pub fn submission_timeout(&self) -> Duration {
        self.chain_config().submission_timeout()
    }

    /// Longest a transfer may take from submission to confirmation.
    #[must_use]
    pub fn max_transfer_duration(&self) -> Duration {
        self.submission_timeout()
            .saturating_add(self.confirmation_timeout())
    }

    /// Confirmation poll interval as a duration.
    #[must_use]
    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    /// Age after which pending records are reconciled.
    #[must_use]
    pub fn stale_pending_after(&self) -> Duration {
        Duration::from_secs(self.stale_pending_seconds)
    }

    /// Settlement client configuration.
    #[must_use]
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig::new()
            .with_rpc_url(&self.solana_rpc)
            .with_mint(self.token_mint.clone().unwrap_or_default())
            .with_decimals(self.token_decimals)
            .with_confirmation_timeout(self.confirmation_timeout())
            .with_poll_interval(self.confirmation_poll_interval())
            .with_rpc_timeout(Duration::from_secs(self.rpc_timeout_seconds))
    }

    /// Orchestrator policy derived from this configuration.
    #[must_use]
    pub fn redemption_policy(&self) -> RedemptionPolicy {
        RedemptionPolicy {
            token_decimals: self.token_decimals,
            refund_max_attempts: self.refund_max_attempts,
            refund_retry_base: Duration::from_millis(self.refund_retry_base_ms),
            ..RedemptionPolicy::default()
        }
    }
}

/// Parse an environment variable, falling back to `default` if unset or invalid.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Load the treasury keypair from a secrets file or the environment.
fn load_treasury_key() -> Option<TreasuryKey> {
    let secret_paths = [
        ".secrets/treasury.json",
        "redemption/.secrets/treasury.json",
        "../.secrets/treasury.json",
    ];

    for path in &secret_paths {
        match load_secrets_file(path) {
            Ok(key) => {
                tracing::info!(path = %path, "Loaded treasury key from file");
                return Some(key);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path, error = %e, "Ignoring unreadable treasury key file"),
        }
    }

    tracing::debug!("Treasury key file not found, using environment variables");
    let json = std::env::var("TREASURY_KEY_JSON").ok()?;
    match TreasuryKey::from_json(&json) {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::warn!(error = %e, "TREASURY_KEY_JSON is not a valid keypair");
            None
        }
    }
}

/// Load a keypair from a `solana-keygen` JSON file.
fn load_secrets_file(path: &str) -> Result<TreasuryKey, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    TreasuryKey::from_json(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/redemption".into(),
            service_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 90,
            max_concurrent_requests: 256,
            solana_rpc: DEVNET_RPC.into(),
            rpc_timeout_seconds: 10,
            token_mint: None,
            token_decimals: 6,
            treasury_key: None,
            confirmation_timeout_seconds: 30,
            confirmation_poll_ms: 500,
            refund_max_attempts: 5,
            refund_retry_base_ms: 100,
            stale_pending_seconds: 300,
            reconcile_interval_seconds: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chain_config().rpc_url, DEVNET_RPC);
        assert_eq!(config.chain_config().decimals, 6);
    }

    #[test]
    fn request_timeout_must_outlast_confirmation() {
        let config = ServiceConfig {
            request_timeout_seconds: 30,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RequestTimeoutTooShort { request: 30, .. })
        ));
    }

    #[test]
    fn request_timeout_must_outlast_submission_too() {
        // 60s covers confirmation alone but not 3 RPC calls of 10s before it.
        let config = ServiceConfig {
            request_timeout_seconds: 60,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RequestTimeoutTooShort {
                request: 60,
                redemption: 67
            })
        ));

        let faster_rpc = ServiceConfig {
            request_timeout_seconds: 60,
            rpc_timeout_seconds: 5,
            ..ServiceConfig::default()
        };
        faster_rpc.validate().unwrap();
        assert_eq!(faster_rpc.max_transfer_duration(), Duration::from_secs(45));
    }

    #[test]
    fn stale_window_must_outlast_requests() {
        let config = ServiceConfig {
            stale_pending_seconds: 60,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StaleWindowTooShort { .. })
        ));
    }

    #[test]
    fn zero_refund_attempts_rejected() {
        let config = ServiceConfig {
            refund_max_attempts: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("REFUND_MAX_ATTEMPTS"))
        ));
    }
}
