//! Provider configuration.
//!
//! Association lifetime, handle generation and secret sizing. Configuration
//! is loaded from environment variables with defaults matching the OpenID
//! 2.0 behaviour this engine implements.

use crate::association::AssociationType;
use crate::error::{ProviderError, ProviderResult};
use chrono::Duration;

/// Longest association lifetime accepted by [`ProviderConfig::validate`].
pub const MAX_ASSOCIATION_TTL_SECS: i64 = 24 * 60 * 60;

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Lifetime of associations created by the provider.
    pub association_ttl: Duration,

    /// Maximum attempts at generating an unused association handle.
    pub handle_attempts: u32,

    /// Length in bytes of generated association secrets.
    pub secret_len: usize,

    /// Signing algorithm for new associations.
    pub association_type: AssociationType,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            association_ttl: Duration::minutes(1),
            handle_attempts: 10,
            secret_len: 128,
            association_type: AssociationType::HmacSha256,
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OPENID_ASSOCIATION_TTL_SECS`: Association lifetime in seconds (default: 60)
    /// - `OPENID_HANDLE_ATTEMPTS`: Handle generation attempts (default: 10)
    /// - `OPENID_SECRET_LEN`: Secret length in bytes (default: 128)
    /// - `OPENID_ASSOCIATION_TYPE`: `HMAC-SHA1` or `HMAC-SHA256` (default: HMAC-SHA256)
    ///
    /// Unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            association_ttl: std::env::var("OPENID_ASSOCIATION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .and_then(Duration::try_seconds)
                .unwrap_or(default.association_ttl),
            handle_attempts: std::env::var("OPENID_HANDLE_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.handle_attempts),
            secret_len: std::env::var("OPENID_SECRET_LEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.secret_len),
            association_type: std::env::var("OPENID_ASSOCIATION_TYPE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.association_type),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.handle_attempts == 0 {
            return Err(ProviderError::ConfigError(
                "handle_attempts must be at least 1".to_string(),
            ));
        }
        if self.association_ttl <= Duration::zero() {
            return Err(ProviderError::ConfigError(
                "association_ttl must be positive".to_string(),
            ));
        }
        if self.association_ttl > Duration::seconds(MAX_ASSOCIATION_TTL_SECS) {
            return Err(ProviderError::ConfigError(format!(
                "association_ttl must be at most {} seconds",
                MAX_ASSOCIATION_TTL_SECS
            )));
        }
        if self.secret_len < self.association_type.digest_len() {
            return Err(ProviderError::ConfigError(format!(
                "secret_len {} is shorter than the {} digest",
                self.secret_len, self.association_type
            )));
        }
        Ok(())
    }
}
