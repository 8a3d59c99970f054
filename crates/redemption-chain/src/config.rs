//! Chain settlement configuration.

use std::fmt;
use std::time::Duration;

use crate::error::{ChainError, Result};

/// Solana devnet RPC endpoint.
pub const DEVNET_RPC: &str = "https://api.devnet.solana.com";

/// Configuration for the settlement chain client.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// RPC endpoint URL (default: devnet).
    pub rpc_url: String,

    /// Mint address of the settlement token.
    pub mint: String,

    /// Decimals of the settlement token (default: 6).
    pub decimals: u8,

    /// How long to wait for a submitted transfer to confirm (default: 30s).
    pub confirmation_timeout: Duration,

    /// Delay between confirmation polls (default: 500ms).
    pub poll_interval: Duration,

    /// Timeout of a single RPC request (default: 10s).
    pub rpc_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEVNET_RPC.to_string(),
            mint: String::new(),
            decimals: 6,
            confirmation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

impl ChainConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the RPC URL.
    #[must_use]
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    /// Set the settlement token mint.
    #[must_use]
    pub fn with_mint(mut self, mint: impl Into<String>) -> Self {
        self.mint = mint.into();
        self
    }

    /// Set the token decimals.
    #[must_use]
    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    /// Set the confirmation timeout.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Set the confirmation poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the timeout of a single RPC request.
    #[must_use]
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Longest a submission can take: one `rpc_timeout` per RPC request it
    /// makes (recipient account lookup, blockhash, send).
    #[must_use]
    pub fn submission_timeout(&self) -> Duration {
        self.rpc_timeout.saturating_mul(SUBMISSION_RPC_CALLS)
    }
}

/// RPC requests made by one transfer submission.
pub const SUBMISSION_RPC_CALLS: u32 = 3;

/// Secret key bytes of the treasury wallet.
///
/// Parsed from the JSON byte-array format written by `solana-keygen`.
#[derive(Clone)]
pub struct TreasuryKey(Vec<u8>);

impl TreasuryKey {
    /// Length of an ed25519 keypair in bytes.
    pub const LEN: usize = 64;

    /// Parse a key from its JSON byte-array form.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or not 64 bytes long.
    pub fn from_json(json: &str) -> Result<Self> {
        let bytes: Vec<u8> = serde_json::from_str(json.trim())
            .map_err(|e| ChainError::InvalidKeypair(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Wrap raw keypair bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not 64 bytes long.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(ChainError::InvalidKeypair(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TreasuryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TreasuryKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChainConfig::default();
        assert_eq!(config.rpc_url, DEVNET_RPC);
        assert_eq!(config.decimals, 6);
        assert_eq!(config.confirmation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ChainConfig::new()
            .with_rpc_url("http://localhost:8899")
            .with_decimals(9)
            .with_poll_interval(Duration::from_millis(50));

        assert_eq!(config.rpc_url, "http://localhost:8899");
        assert_eq!(config.decimals, 9);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn submission_timeout_covers_every_rpc_call() {
        let config = ChainConfig::new().with_rpc_timeout(Duration::from_secs(4));
        assert_eq!(config.submission_timeout(), Duration::from_secs(12));
        assert_eq!(
            ChainConfig::default().submission_timeout(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn treasury_key_parses_keygen_json() {
        let json = serde_json::to_string(&vec![7u8; 64]).unwrap();
        let key = TreasuryKey::from_json(&json).unwrap();
        assert_eq!(key.as_bytes().len(), 64);
        assert_eq!(format!("{key:?}"), "TreasuryKey(<redacted>)");
    }

    #[test]
    fn treasury_key_rejects_wrong_length() {
        assert!(TreasuryKey::from_json("[1,2,3]").is_err());
        assert!(TreasuryKey::from_json("not json").is_err());
    }
}
