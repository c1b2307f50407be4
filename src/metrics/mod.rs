//! Request metrics collection, aggregation, and export.
//!
//! Mirrors the rest of this crate's design: a bounded in-memory buffer
//! guarded by `parking_lot`, a `DashMap` for state that grows with the
//! number of distinct upstreams rather than with request volume, and every
//! aggregation taking its notion of "now" from an injected [`crate::clock::Clock`].

mod collector;
mod health;

pub use collector::{
    AggregatedMetrics, MetricsCollector, PathStats, RateLimitTag, RequestMetric, StatusStats,
    TimeSeriesBucket, UpstreamStats,
};
pub use health::HealthCheckResult;
