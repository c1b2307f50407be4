//! Gateway configuration loaded from the process environment.
//!
//! No config-file crate is introduced: the surface here is a handful of
//! environment variables, which `std::env` reads directly — matching the
//! rest of this crate's library design, which never assumed a config
//! format either.

use crate::error::{ConfigError, Result};

/// Default backend base URL used when `BACKEND_URL` is unset.
pub const DEFAULT_BACKEND_URL: &str = "https://api.openai.com/v1";

/// Gateway-wide configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Whether a KV namespace is bound (`RATE_LIMIT` present). When `false`,
    /// the pipeline skips rate limiting entirely rather than failing closed.
    pub kv_configured: bool,
    /// Free-form environment label echoed by `/api/version` (e.g. "production").
    pub environment: String,
    /// Configured API keys. Empty means API-key gating is disabled.
    pub api_keys: Vec<String>,
    /// Base URL the AI proxy route rewrites onto.
    pub backend_url: String,
    /// When true, requests with no credentials are rejected with 401 instead
    /// of passing through permissively.
    pub strict_auth: bool,
}

impl GatewayConfig {
    /// Load configuration from the environment, applying the same
    /// fallbacks and parsing rules as the external gateway's runtime.
    pub fn from_env() -> Result<Self> {
        let kv_configured = std::env::var("RATE_LIMIT").is_ok();

        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let api_keys = std::env::var("API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let backend_url = std::env::var("BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.into());
        if backend_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "BACKEND_URL".into(),
                message: "must not be empty".into(),
            }
            .into());
        }

        let strict_auth = std::env::var("STRICT_AUTH")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            kv_configured,
            environment,
            api_keys,
            backend_url,
            strict_auth,
        })
    }

    /// Whether API-key gating is active (non-empty key set).
    pub fn api_key_gating_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Whether `key` is one of the configured API keys.
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.api_keys.iter().any(|k| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_split_and_trim() {
        let config = GatewayConfig {
            kv_configured: true,
            environment: "test".into(),
            api_keys: "a, b ,c".split(',').map(|s| s.trim().to_string()).collect(),
            backend_url: DEFAULT_BACKEND_URL.into(),
            strict_auth: false,
        };
        assert!(config.is_valid_api_key("b"));
        assert!(!config.is_valid_api_key("z"));
    }

    #[test]
    fn empty_key_set_disables_gating() {
        let config = GatewayConfig {
            kv_configured: false,
            environment: "test".into(),
            api_keys: Vec::new(),
            backend_url: DEFAULT_BACKEND_URL.into(),
            strict_auth: false,
        };
        assert!(!config.api_key_gating_enabled());
    }
}
