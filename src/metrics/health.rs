//! Upstream health probing over HTTP.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Last-observed health state for one upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Whether the most recent probe succeeded.
    pub healthy: bool,
    /// Round-trip latency of the most recent probe.
    pub latency_ms: u64,
    /// Number of consecutive failed probes, reset to 0 on success.
    pub consecutive_failures: u32,
    /// When this result was produced.
    pub last_checked_ms: u64,
    /// HTTP status of the last probe, if one was received.
    pub last_status: Option<u16>,
    /// Error detail from the last failed probe, if any.
    pub error: Option<String>,
}

/// Probe `upstream`'s health endpoint and report the outcome. Success is any
/// 2xx response; anything else, including a timeout or connection failure,
/// counts as unhealthy.
pub(super) async fn probe_upstream(
    client: &reqwest::Client,
    clock: &dyn Clock,
    upstream: &str,
    health_path: &str,
    timeout_ms: u64,
    previous: Option<&HealthCheckResult>,
) -> HealthCheckResult {
    let url = format!("{}{}", upstream.trim_end_matches('/'), health_path);
    let started_ms = clock.now_ms();
    let prev_failures = previous.map(|p| p.consecutive_failures).unwrap_or(0);

    let outcome = client
        .get(&url)
        .timeout(Duration::from_millis(timeout_ms))
        .send()
        .await;

    let now_ms = clock.now_ms();
    let latency_ms = now_ms.saturating_sub(started_ms);

    match outcome {
        Ok(response) if response.status().is_success() => HealthCheckResult {
            healthy: true,
            latency_ms,
            consecutive_failures: 0,
            last_checked_ms: now_ms,
            last_status: Some(response.status().as_u16()),
            error: None,
        },
        Ok(response) => HealthCheckResult {
            healthy: false,
            latency_ms,
            consecutive_failures: prev_failures + 1,
            last_checked_ms: now_ms,
            last_status: Some(response.status().as_u16()),
            error: Some(format!("non-2xx status: {}", response.status())),
        },
        Err(err) => HealthCheckResult {
            healthy: false,
            latency_ms,
            consecutive_failures: prev_failures + 1,
            last_checked_ms: now_ms,
            last_status: None,
            error: Some(err.to_string()),
        },
    }
}
