//! Edge API gateway core: policy-enforcement pipeline, rate-limiting/quota
//! engine, and metrics aggregation.
//!
//! `edge_gateway` terminates client HTTP requests, applies cross-cutting
//! policies (rate limiting, quota enforcement, authentication, CORS,
//! logging), and records observability data before a request is forwarded
//! to an upstream. The core is the **policy-enforcement pipeline and the
//! rate-limiting/quota engine** it depends on, together with the **metrics
//! aggregation** that feeds health and adaptive decisions:
//!
//! - **Four rate-limit algorithms** behind one [`algorithm::Algorithm`]
//!   contract: [`algorithm::SlidingWindow`], [`algorithm::TokenBucket`],
//!   [`algorithm::LeakyBucket`], [`algorithm::FixedWindow`].
//! - **[`quota_manager`]**: per-user minute/day/month counters with
//!   automatic period rollover.
//! - **[`adaptive`]**: a load-factor controller that re-prices requests
//!   under load by rescaling [`algorithm::TokenBucket`]'s request cost.
//! - **[`composite`]**: a priority-ordered stack of limiters; first denial
//!   wins.
//! - **[`metrics`]**: a bounded in-memory ring of request records, an
//!   aggregation engine (totals, percentiles, time series), and an
//!   upstream health probe.
//! - **[`pipeline`]**: the ordered middleware chain — identify client,
//!   composite-limit, authenticate, forward, record — as a Tower layer.
//!
//! Everything above is injected against a narrow [`kv::KvStore`] trait (the
//! only source of cross-instance shared state) and an injectable
//! [`clock::Clock`], so tests never sleep and any KV backend can be plugged
//! in without touching the core.
//!
//! # Quick Start
//!
//! ```ignore
//! use edge_gateway::{Algorithm, Quota, clock::SystemClock, kv::MemoryKv};
//! use edge_gateway::algorithm::TokenBucket;
//!
//! #[tokio::main]
//! async fn main() {
//!     let kv = MemoryKv::new();
//!     let clock = SystemClock;
//!     let algorithm = TokenBucket::new();
//!     let quota = Quota::per_second(10).with_burst(15);
//!
//!     let decision = algorithm.check_and_record(&kv, &clock, "user:123", &quota).await.unwrap();
//!     if decision.is_allowed() {
//!         println!("allowed, {} remaining", decision.info().remaining);
//!     } else {
//!         println!("rate limited, retry after {:?}", decision.info().retry_after);
//!     }
//! }
//! ```
//!
//! # Algorithms
//!
//! | Algorithm | Best For | Burst | Feature Flag |
//! |-----------|----------|-------|--------------|
//! | Token Bucket | Bursty traffic | Excellent | default |
//! | Leaky Bucket | Smooth output | None | `leaky-bucket` |
//! | Sliding Window | Precision critical | Good, no boundary burst | default |
//! | Fixed Window | Simple use cases | Poor (up to 2x at boundary) | default |
//!
//! # Feature Flags
//!
//! - `memory` (default): in-memory [`kv::KvStore`] backed by `DashMap`.
//! - `axum` (default): the [`pipeline`] Tower layer and the `gateway` demo binary.
//! - `leaky-bucket` (default, via `all-algorithms`): the Leaky Bucket algorithm.

pub mod adaptive;
pub mod algorithm;
pub mod clock;
pub mod composite;
pub mod config;
pub mod decision;
pub mod error;
pub mod kv;
pub mod metrics;
pub mod quota;
pub mod quota_manager;

#[cfg(feature = "axum")]
pub mod pipeline;

// Re-export core types.
pub use algorithm::Algorithm;
pub use clock::Clock;
pub use decision::{Decision, DecisionMetadata, RateLimitInfo};
pub use error::{ConfigError, GatewayError, KvError, Result};
pub use quota::{Quota, QuotaBuilder};

// Re-export algorithms.
pub use algorithm::{FixedWindow, SlidingWindow, TokenBucket};

#[cfg(feature = "leaky-bucket")]
pub use algorithm::LeakyBucket;

// Re-export the gateway-specific components built on top of the algorithms.
pub use adaptive::AdaptiveController;
pub use composite::{CompositeDecision, CompositeLimiter, LimiterEntry};
pub use config::GatewayConfig;
pub use kv::{KvStore, MemoryKv};
pub use metrics::{
    AggregatedMetrics, HealthCheckResult, MetricsCollector, RateLimitTag, RequestMetric,
};
pub use quota_manager::{ExceededQuota, PeriodUsage, QuotaCheck, QuotaConfig, QuotaManager};

#[cfg(feature = "axum")]
pub use pipeline::{GatewayState, PolicyLayer};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::algorithm::Algorithm;
    pub use crate::algorithm::{FixedWindow, SlidingWindow, TokenBucket};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::decision::{Decision, RateLimitInfo};
    pub use crate::error::{GatewayError, Result};
    pub use crate::kv::{KvStore, MemoryKv};
    pub use crate::quota::Quota;

    #[cfg(feature = "leaky-bucket")]
    pub use crate::algorithm::LeakyBucket;

    pub use crate::adaptive::AdaptiveController;
    pub use crate::composite::{CompositeLimiter, LimiterEntry};
    pub use crate::metrics::MetricsCollector;
    pub use crate::quota_manager::{QuotaConfig, QuotaManager};

    #[cfg(feature = "axum")]
    pub use crate::pipeline::{GatewayState, PolicyLayer};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn test_integration_token_bucket() {
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let algorithm = TokenBucket::new();
        let quota = Quota::per_minute(60).with_burst(10);

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();

        assert!(decision.is_allowed());
        assert_eq!(decision.info().remaining, 9);
        assert_eq!(decision.info().algorithm, Some("token_bucket"));
    }

    #[tokio::test]
    async fn test_integration_sliding_window_burst() {
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let algorithm = SlidingWindow::new();
        let quota = Quota::per_second(5);

        for i in 1..=5 {
            let decision = algorithm
                .check_and_record(&kv, &clock, "user:1", &quota)
                .await
                .unwrap();
            assert!(decision.is_allowed(), "request {i} should be allowed");
        }

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_denied());
        assert!(decision.info().retry_after.is_some());
    }

    #[tokio::test]
    async fn test_integration_headers() {
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let algorithm = FixedWindow::new();
        let quota = Quota::per_minute(100);

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();

        let headers = decision.info().to_headers();
        assert!(headers.iter().any(|(k, _)| *k == "X-RateLimit-Limit"));
        assert!(headers.iter().any(|(k, _)| *k == "X-RateLimit-Remaining"));
        assert!(headers.iter().any(|(k, _)| *k == "X-RateLimit-Reset"));
    }

    #[tokio::test]
    async fn test_integration_quota_and_metrics_share_a_clock() {
        use crate::metrics::{MetricsCollector, RequestMetric};
        use crate::quota_manager::{QuotaConfig, QuotaManager};

        let kv = MemoryKv::new();
        let clock = crate::clock::ManualClock::new(0);
        let quota_manager = QuotaManager::new();
        let config = QuotaConfig::new(2, 10, 100);

        let check = quota_manager
            .check_and_increment(&kv, &clock, "user:1", &config)
            .await
            .unwrap();
        assert!(check.allowed);

        let metrics = MetricsCollector::new(100);
        metrics.record(RequestMetric::new(clock.now_ms(), "/api/data", 200, 12));
        let aggregated = metrics.get_aggregated(&clock, 1);
        assert_eq!(aggregated.total, 1);
    }
}
