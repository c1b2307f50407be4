//! Bounded request-metrics buffer, aggregation, and Prometheus export.

use std::collections::{BTreeMap, HashMap};
use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::clock::Clock;

use super::health::{self, HealthCheckResult};

/// Snapshot of the rate-limit decision that applied to a request, spec §3's
/// `rateLimitInfo?` field on `RequestMetric`.
#[derive(Debug, Clone)]
pub struct RateLimitTag {
    /// Name of the limiter that produced this decision (see `CompositeDecision::limiter_name`).
    pub limiter: String,
    /// Configured limit.
    pub limit: u64,
    /// Remaining quota after this request.
    pub remaining: u64,
    /// Seconds until the limit window resets.
    pub reset_seconds: u64,
}

/// One recorded request/response pair.
#[derive(Debug, Clone)]
pub struct RequestMetric {
    /// When the request completed, in Unix milliseconds.
    pub timestamp_ms: u64,
    /// Request path, used for per-path aggregation.
    pub path: String,
    /// HTTP method of the request.
    pub method: String,
    /// Response status code.
    pub status: u16,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Whether the response was served from cache (`X-Cache: HIT`).
    pub cached: bool,
    /// Upstream that served the request, from `X-Upstream`, if forwarded.
    pub upstream: Option<String>,
    /// The rate-limit decision that applied to this request, if the policy
    /// pipeline ran one.
    pub rate_limit: Option<RateLimitTag>,
}

impl RequestMetric {
    /// Build a new metric record. Defaults `method` to `"GET"`; use
    /// [`RequestMetric::with_method`] to override it.
    pub fn new(timestamp_ms: u64, path: impl Into<String>, status: u16, latency_ms: u64) -> Self {
        Self {
            timestamp_ms,
            path: path.into(),
            method: "GET".to_string(),
            status,
            latency_ms,
            cached: false,
            upstream: None,
            rate_limit: None,
        }
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Mark this request as cache-served.
    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    /// Tag the upstream that served this request.
    pub fn with_upstream(mut self, upstream: impl Into<String>) -> Self {
        self.upstream = Some(upstream.into());
        self
    }

    /// Attach the rate-limit decision that applied to this request.
    pub fn with_rate_limit(mut self, tag: RateLimitTag) -> Self {
        self.rate_limit = Some(tag);
        self
    }
}

/// Per-path breakdown within an aggregation window.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathStats {
    pub count: u64,
    pub avg_latency_ms: f64,
    pub errors: u64,
}

/// Per-status-code breakdown within an aggregation window.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusStats {
    pub count: u64,
}

/// Per-upstream breakdown within an aggregation window.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamStats {
    pub count: u64,
    pub avg_latency_ms: f64,
    pub errors: u64,
    pub healthy: bool,
}

/// Aggregated view over the metrics buffer for a trailing window.
#[derive(Debug, Clone)]
pub struct AggregatedMetrics {
    pub total: u64,
    pub success: u64,
    pub errors: u64,
    pub cached: u64,
    pub rate_limited: u64,
    pub latency_avg_ms: f64,
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub by_path: HashMap<String, PathStats>,
    pub by_status: HashMap<u16, StatusStats>,
    pub by_upstream: HashMap<String, UpstreamStats>,
}

/// One bucket of a time series produced by `get_time_series`.
#[derive(Debug, Clone, Copy)]
pub struct TimeSeriesBucket {
    pub bucket_start_ms: u64,
    pub total: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
}

/// `sorted[ceil(p/100 * n) - 1]`, floored at index 0. `sorted` must already
/// be sorted ascending.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let n = sorted.len() as f64;
    let idx = ((p / 100.0 * n).ceil() as isize - 1).max(0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Collects request metrics in a bounded ring buffer and serves aggregated
/// views over them. Cheap to clone: internally `Arc`-free but designed to be
/// held behind a single shared instance (e.g. `Arc<MetricsCollector>`) across
/// the pipeline.
pub struct MetricsCollector {
    max_metrics: usize,
    buffer: RwLock<VecDeque<RequestMetric>>,
    health: DashMap<String, HealthCheckResult>,
    http: reqwest::Client,
}

impl MetricsCollector {
    /// Create a new collector bounded at `max_metrics` entries.
    pub fn new(max_metrics: usize) -> Self {
        Self {
            max_metrics,
            buffer: RwLock::new(VecDeque::with_capacity(max_metrics.min(1024))),
            health: DashMap::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Record one request. If this pushes the buffer past `max_metrics`, the
    /// oldest entries are dropped from the front.
    pub fn record(&self, metric: RequestMetric) {
        let mut buffer = self.buffer.write();
        buffer.push_back(metric);
        while buffer.len() > self.max_metrics {
            buffer.pop_front();
        }
    }

    /// Current number of buffered metrics.
    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    fn windowed_snapshot(&self, clock: &dyn Clock, window_minutes: u64) -> Vec<RequestMetric> {
        let now = clock.now_ms();
        let cutoff = now.saturating_sub(window_minutes * 60_000);
        self.buffer
            .read()
            .iter()
            .filter(|m| m.timestamp_ms >= cutoff)
            .cloned()
            .collect()
    }

    /// Aggregate metrics over the trailing `window_minutes`.
    pub fn get_aggregated(&self, clock: &dyn Clock, window_minutes: u64) -> AggregatedMetrics {
        let windowed = self.windowed_snapshot(clock, window_minutes);

        let total = windowed.len() as u64;
        let success = windowed
            .iter()
            .filter(|m| (200..400).contains(&m.status))
            .count() as u64;
        let rate_limited = windowed.iter().filter(|m| m.status == 429).count() as u64;
        let errors = total - success;
        let cached = windowed.iter().filter(|m| m.cached).count() as u64;

        let mut latencies: Vec<u64> = windowed.iter().map(|m| m.latency_ms).collect();
        latencies.sort_unstable();

        let latency_avg_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
        };
        let latency_min_ms = latencies.first().copied().unwrap_or(0);
        let latency_max_ms = latencies.last().copied().unwrap_or(0);

        let p50_ms = percentile(&latencies, 50.0);
        let p95_ms = percentile(&latencies, 95.0);
        let p99_ms = percentile(&latencies, 99.0);

        let mut path_acc: HashMap<String, (u64, u64, u64)> = HashMap::new();
        let mut status_acc: HashMap<u16, u64> = HashMap::new();
        let mut upstream_acc: HashMap<String, (u64, u64, u64)> = HashMap::new();

        for m in &windowed {
            let path_entry = path_acc.entry(m.path.clone()).or_insert((0, 0, 0));
            path_entry.0 += 1;
            path_entry.1 += m.latency_ms;
            if m.status >= 400 {
                path_entry.2 += 1;
            }

            *status_acc.entry(m.status).or_insert(0) += 1;

            if let Some(upstream) = &m.upstream {
                let upstream_entry = upstream_acc.entry(upstream.clone()).or_insert((0, 0, 0));
                upstream_entry.0 += 1;
                upstream_entry.1 += m.latency_ms;
                if m.status >= 500 {
                    upstream_entry.2 += 1;
                }
            }
        }

        let by_path = path_acc
            .into_iter()
            .map(|(path, (count, latency_sum, errors))| {
                let avg_latency_ms = latency_sum as f64 / count.max(1) as f64;
                (
                    path,
                    PathStats {
                        count,
                        avg_latency_ms,
                        errors,
                    },
                )
            })
            .collect();

        let by_status = status_acc
            .into_iter()
            .map(|(status, count)| (status, StatusStats { count }))
            .collect();

        let by_upstream = upstream_acc
            .into_iter()
            .map(|(upstream, (count, latency_sum, errors))| {
                let avg_latency_ms = latency_sum as f64 / count.max(1) as f64;
                let healthy = self
                    .health
                    .get(&upstream)
                    .map(|r| r.healthy)
                    .unwrap_or(true);
                (
                    upstream,
                    UpstreamStats {
                        count,
                        avg_latency_ms,
                        errors,
                        healthy,
                    },
                )
            })
            .collect();

        AggregatedMetrics {
            total,
            success,
            errors,
            cached,
            rate_limited,
            latency_avg_ms,
            latency_min_ms,
            latency_max_ms,
            p50_ms,
            p95_ms,
            p99_ms,
            by_path,
            by_status,
            by_upstream,
        }
    }

    /// Bucket the trailing `window_minutes` of metrics into `bucket_minutes`
    /// buckets, returned sorted ascending by bucket start.
    pub fn get_time_series(
        &self,
        clock: &dyn Clock,
        window_minutes: u64,
        bucket_minutes: u64,
    ) -> Vec<TimeSeriesBucket> {
        let bucket_ms = bucket_minutes.max(1) * 60_000;
        let windowed = self.windowed_snapshot(clock, window_minutes);

        let mut buckets: BTreeMap<u64, (u64, u64, u64)> = BTreeMap::new();
        for m in &windowed {
            let bucket_start = (m.timestamp_ms / bucket_ms) * bucket_ms;
            let entry = buckets.entry(bucket_start).or_insert((0, 0, 0));
            entry.0 += 1;
            if m.status >= 400 {
                entry.1 += 1;
            }
            entry.2 += m.latency_ms;
        }

        buckets
            .into_iter()
            .map(|(bucket_start_ms, (total, errors, latency_sum))| TimeSeriesBucket {
                bucket_start_ms,
                total,
                errors,
                avg_latency_ms: latency_sum as f64 / total.max(1) as f64,
            })
            .collect()
    }

    /// The `limit` most-requested paths over the full buffer, descending by
    /// count.
    pub fn get_top_paths(&self, limit: usize) -> Vec<(String, u64)> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for m in self.buffer.read().iter() {
            *counts.entry(m.path.clone()).or_insert(0) += 1;
        }
        let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(limit);
        entries
    }

    /// Paths whose average latency over the full buffer is at or above
    /// `threshold_ms`, descending by average latency.
    pub fn get_slow_endpoints(&self, threshold_ms: u64) -> Vec<(String, f64)> {
        let mut sums: HashMap<String, (u64, u64)> = HashMap::new();
        for m in self.buffer.read().iter() {
            let entry = sums.entry(m.path.clone()).or_insert((0, 0));
            entry.0 += m.latency_ms;
            entry.1 += 1;
        }

        let mut result: Vec<(String, f64)> = sums
            .into_iter()
            .map(|(path, (sum, count))| (path, sum as f64 / count.max(1) as f64))
            .filter(|(_, avg)| *avg >= threshold_ms as f64)
            .collect();

        result.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        result
    }

    /// Probe `upstream` and persist the result in the health map.
    pub async fn check_upstream(
        &self,
        clock: &dyn Clock,
        upstream: &str,
        health_path: &str,
        timeout_ms: u64,
    ) -> HealthCheckResult {
        let previous = self.health.get(upstream).map(|entry| entry.clone());
        let result = health::probe_upstream(
            &self.http,
            clock,
            upstream,
            health_path,
            timeout_ms,
            previous.as_ref(),
        )
        .await;
        self.health.insert(upstream.to_string(), result.clone());
        result
    }

    /// Render the trailing `window_minutes` as Prometheus text exposition.
    pub fn to_prometheus(&self, clock: &dyn Clock, window_minutes: u64) -> String {
        let aggregated = self.get_aggregated(clock, window_minutes);
        let mut out = String::new();

        out.push_str("# HELP gateway_requests_total Total requests observed in the aggregation window.\n");
        out.push_str("# TYPE gateway_requests_total counter\n");
        out.push_str(&format!("gateway_requests_total {}\n", aggregated.total));

        out.push_str("# HELP gateway_errors_total Requests with a non-2xx/3xx status in the aggregation window.\n");
        out.push_str("# TYPE gateway_errors_total counter\n");
        out.push_str(&format!("gateway_errors_total {}\n", aggregated.errors));

        out.push_str("# HELP gateway_latency_ms Request latency quantiles in milliseconds.\n");
        out.push_str("# TYPE gateway_latency_ms gauge\n");
        out.push_str(&format!(
            "gateway_latency_ms{{quantile=\"0.5\"}} {}\n",
            aggregated.p50_ms
        ));
        out.push_str(&format!(
            "gateway_latency_ms{{quantile=\"0.95\"}} {}\n",
            aggregated.p95_ms
        ));
        out.push_str(&format!(
            "gateway_latency_ms{{quantile=\"0.99\"}} {}\n",
            aggregated.p99_ms
        ));

        out.push_str("# HELP gateway_upstream_healthy Whether the upstream's last health probe succeeded.\n");
        out.push_str("# TYPE gateway_upstream_healthy gauge\n");
        for entry in self.health.iter() {
            let value = if entry.value().healthy { 1 } else { 0 };
            out.push_str(&format!(
                "gateway_upstream_healthy{{upstream=\"{}\"}} {}\n",
                entry.key(),
                value
            ));
        }

        out
    }
}
