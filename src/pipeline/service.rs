//! The policy pipeline: a Tower layer running every request through
//! logging, CORS, client identification, composite rate limiting, and
//! authentication before it reaches the inner router.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, Method, Request, Response, StatusCode};
use tower::{Layer, Service};

use crate::clock::Clock;
use crate::composite::CompositeLimiter;
use crate::config::GatewayConfig;
use crate::kv::KvStore;
use crate::metrics::{MetricsCollector, RateLimitTag, RequestMetric};

use super::auth::{self, AuthOutcome};
use super::cors;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_request_id(clock: &dyn Clock) -> String {
    let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{:x}-{:x}", clock.now_ms(), seq)
}

fn identify_client(headers: &axum::http::HeaderMap) -> String {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return format!("apikey:{key}");
    }
    if let Some(ip) = headers.get("cf-connecting-ip").and_then(|v| v.to_str().ok()) {
        return format!("ip:{ip}");
    }
    "anonymous".to_string()
}

fn json_response(
    status: StatusCode,
    body: &serde_json::Value,
    extra_headers: Vec<(&'static str, String)>,
) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/json"));
    for (name, value) in extra_headers {
        if let Ok(header_value) = value.parse() {
            response.headers_mut().insert(name, header_value);
        }
    }
    response
}

/// Shared state threaded through every request the pipeline handles.
pub struct GatewayState<S: KvStore> {
    pub kv: Arc<S>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<GatewayConfig>,
    pub limiter: Arc<CompositeLimiter<S>>,
    pub metrics: Arc<MetricsCollector>,
    /// Path prefix subject to rate limiting, e.g. `/api/`.
    pub rate_limited_prefix: String,
}

/// Tower layer applying the full request policy pipeline.
pub struct PolicyLayer<S: KvStore> {
    state: Arc<GatewayState<S>>,
}

impl<S: KvStore> PolicyLayer<S> {
    /// Create a new policy layer over shared gateway state.
    pub fn new(state: Arc<GatewayState<S>>) -> Self {
        Self { state }
    }
}

impl<S: KvStore> Clone for PolicyLayer<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<S, Inner> Layer<Inner> for PolicyLayer<S>
where
    S: KvStore,
{
    type Service = PolicyService<S, Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        PolicyService {
            inner,
            state: self.state.clone(),
        }
    }
}

/// The pipeline service itself.
pub struct PolicyService<S: KvStore, Inner> {
    inner: Inner,
    state: Arc<GatewayState<S>>,
}

impl<S, Inner> Clone for PolicyService<S, Inner>
where
    S: KvStore,
    Inner: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S, Inner> Service<Request<Body>> for PolicyService<S, Inner>
where
    S: KvStore + Send + Sync + 'static,
    Inner: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    Inner::Future: Send,
{
    type Response = Response<Body>;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let start_ms = state.clock.now_ms();
            let request_id = next_request_id(state.clock.as_ref());
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            tracing::info!(
                request_id = %request_id,
                method = %method.as_str(),
                path = %path,
                "request received"
            );

            if method == Method::OPTIONS {
                let mut response = cors::preflight_response();
                if let Ok(header_value) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert("x-request-id", header_value);
                }
                return Ok(response);
            }

            let client_key = identify_client(request.headers());

            let mut rate_limit_headers: Vec<(&'static str, String)> = Vec::new();
            let mut rate_limit_tag: Option<RateLimitTag> = None;

            if path.starts_with(&state.rate_limited_prefix) && state.config.kv_configured {
                match state
                    .limiter
                    .check_and_record(&state.kv, state.clock.as_ref(), &client_key)
                    .await
                {
                    Ok(outcome) if outcome.is_allowed() => {
                        let info = outcome.decision.info();
                        rate_limit_headers = info.to_headers();
                        rate_limit_tag = Some(RateLimitTag {
                            limiter: outcome.limiter_name.clone(),
                            limit: info.limit,
                            remaining: info.remaining,
                            reset_seconds: info.reset_seconds(),
                        });
                    }
                    Ok(outcome) => {
                        let info = outcome.decision.info();
                        let retry_after = info.retry_after_seconds().unwrap_or(60);
                        let body = serde_json::json!({
                            "error": "Too Many Requests",
                            "message": format!("rate limit exceeded: {}", outcome.limiter_name),
                            "retryAfter": retry_after,
                        });
                        let latency_ms = state.clock.now_ms().saturating_sub(start_ms);
                        let metric = RequestMetric::new(
                            state.clock.now_ms(),
                            path,
                            StatusCode::TOO_MANY_REQUESTS.as_u16(),
                            latency_ms,
                        )
                        .with_method(method.as_str())
                        .with_rate_limit(RateLimitTag {
                            limiter: outcome.limiter_name.clone(),
                            limit: info.limit,
                            remaining: info.remaining,
                            reset_seconds: info.reset_seconds(),
                        });
                        state.metrics.record(metric);

                        return Ok(json_response(
                            StatusCode::TOO_MANY_REQUESTS,
                            &body,
                            info.to_headers(),
                        ));
                    }
                    Err(err) => {
                        tracing::warn!(
                            request_id = %request_id,
                            error = %err,
                            "rate limit check failed, failing open"
                        );
                    }
                }
            }

            match auth::authenticate(request.headers(), &state.config) {
                AuthOutcome::Pass => {}
                AuthOutcome::Reject => {
                    let body = serde_json::json!({
                        "error": "Unauthorized",
                        "message": "missing or invalid credentials",
                    });
                    return Ok(json_response(StatusCode::UNAUTHORIZED, &body, Vec::new()));
                }
            }

            let response = inner.call(request).await;

            if let Ok(mut response) = response {
                let upstream = response
                    .headers()
                    .get("x-upstream")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let cached = response
                    .headers()
                    .get("x-cache")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.eq_ignore_ascii_case("HIT"))
                    .unwrap_or(false);
                let status = response.status().as_u16();
                let latency_ms = state.clock.now_ms().saturating_sub(start_ms);

                let mut metric =
                    RequestMetric::new(state.clock.now_ms(), path, status, latency_ms)
                        .with_method(method.as_str())
                        .with_cached(cached);
                if let Some(upstream) = upstream {
                    metric = metric.with_upstream(upstream);
                }
                if let Some(tag) = rate_limit_tag {
                    metric = metric.with_rate_limit(tag);
                }
                state.metrics.record(metric);

                for (name, value) in rate_limit_headers {
                    if let Ok(header_value) = value.parse() {
                        response.headers_mut().insert(name, header_value);
                    }
                }
                cors::apply_cors_headers(&mut response);
                Ok(response)
            } else {
                response
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let clock = crate::clock::ManualClock::new(0);
        let a = next_request_id(&clock);
        let b = next_request_id(&clock);
        assert_ne!(a, b);
    }

    #[test]
    fn identify_client_prefers_api_key() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("abc"));
        headers.insert("cf-connecting-ip", HeaderValue::from_static("1.2.3.4"));
        assert_eq!(identify_client(&headers), "apikey:abc");
    }

    #[test]
    fn identify_client_falls_back_to_anonymous() {
        let headers = axum::http::HeaderMap::new();
        assert_eq!(identify_client(&headers), "anonymous");
    }
}
