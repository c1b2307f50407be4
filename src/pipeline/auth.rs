//! Authentication step of the policy pipeline.

use axum::http::HeaderMap;

use crate::config::GatewayConfig;

/// Outcome of the authentication step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No credential was required, or the one presented checked out.
    Pass,
    /// Strict mode with no credential, or a credential that failed
    /// validation.
    Reject,
}

/// Validate request credentials against `config`.
///
/// - `X-API-Key` is checked against the configured key set; an empty set
///   means gating is disabled, so any value (or none) passes.
/// - Otherwise `Authorization: Bearer <token>` is accepted for any
///   non-empty token — the gateway doesn't validate token contents itself,
///   that's delegated to whatever issues them.
/// - With neither header present: permissive mode passes the request
///   through; strict mode rejects it.
pub fn authenticate(headers: &HeaderMap, config: &GatewayConfig) -> AuthOutcome {
    if let Some(api_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return if !config.api_key_gating_enabled() || config.is_valid_api_key(api_key) {
            AuthOutcome::Pass
        } else {
            AuthOutcome::Reject
        };
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        return match auth.strip_prefix("Bearer ") {
            Some(token) if !token.is_empty() => AuthOutcome::Pass,
            _ => AuthOutcome::Reject,
        };
    }

    if config.strict_auth {
        AuthOutcome::Reject
    } else {
        AuthOutcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(api_keys: Vec<&str>, strict: bool) -> GatewayConfig {
        GatewayConfig {
            kv_configured: true,
            environment: "test".into(),
            api_keys: api_keys.into_iter().map(String::from).collect(),
            backend_url: crate::config::DEFAULT_BACKEND_URL.into(),
            strict_auth: strict,
        }
    }

    #[test]
    fn valid_api_key_passes() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("good"));
        assert_eq!(authenticate(&headers, &config(vec!["good"], false)), AuthOutcome::Pass);
    }

    #[test]
    fn invalid_api_key_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("bad"));
        assert_eq!(authenticate(&headers, &config(vec!["good"], false)), AuthOutcome::Reject);
    }

    #[test]
    fn no_credentials_permissive_by_default() {
        let headers = HeaderMap::new();
        assert_eq!(authenticate(&headers, &config(vec![], false)), AuthOutcome::Pass);
    }

    #[test]
    fn no_credentials_rejected_in_strict_mode() {
        let headers = HeaderMap::new();
        assert_eq!(authenticate(&headers, &config(vec![], true)), AuthOutcome::Reject);
    }

    #[test]
    fn bearer_token_accepted_when_non_empty() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(authenticate(&headers, &config(vec![], true)), AuthOutcome::Pass);
    }
}
