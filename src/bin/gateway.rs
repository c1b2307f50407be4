//! Thin Axum demo binary exercising the gateway library end to end.
//!
//! Wires an in-memory KV store, a composite rate limiter (a per-second
//! Token Bucket guard in front of a daily Fixed Window ceiling), a quota
//! manager, and the policy pipeline around a handful of illustrative
//! routes. Not meant as a production deployment — see the library crate
//! for the pieces an embedder would actually wire into their own router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::json;

use edge_gateway::algorithm::{FixedWindow, TokenBucket};
use edge_gateway::clock::{Clock, SystemClock};
use edge_gateway::composite::{CompositeLimiter, LimiterEntry};
use edge_gateway::config::GatewayConfig;
use edge_gateway::kv::MemoryKv;
use edge_gateway::metrics::MetricsCollector;
use edge_gateway::pipeline::{GatewayState, PolicyLayer};
use edge_gateway::quota::Quota;

const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
const MAX_METRICS: usize = 10_000;

#[derive(Clone)]
struct AppState {
    config: Arc<GatewayConfig>,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Arc::new(GatewayConfig::from_env().expect("invalid gateway configuration"));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let kv = Arc::new(MemoryKv::new());
    let metrics = Arc::new(MetricsCollector::new(MAX_METRICS));

    let limiter = Arc::new(
        CompositeLimiter::new()
            .with_entry(LimiterEntry::new(
                "per_second_burst",
                10,
                Quota::per_second(10).with_burst(20),
                TokenBucket::new(),
            ))
            .with_entry(LimiterEntry::new(
                "daily_ceiling",
                0,
                Quota::per_day(100_000),
                FixedWindow::new(),
            )),
    );

    let gateway_state = Arc::new(GatewayState {
        kv,
        clock: clock.clone(),
        config: config.clone(),
        limiter,
        metrics,
        rate_limited_prefix: "/api/".to_string(),
    });

    let app_state = AppState {
        config: config.clone(),
        clock,
        http: reqwest::Client::new(),
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .route("/api/services", get(services_handler))
        .route("/api/version", get(version_handler))
        .route("/api/echo", any(echo_handler))
        .route("/api/ai/{*rest}", any(ai_proxy_handler))
        .route("/api/{*rest}", any(generic_proxy_handler))
        .fallback(not_found_handler)
        .with_state(app_state)
        .layer(PolicyLayer::new(gateway_state));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind listener");

    tracing::info!(environment = %config.environment, "gateway listening on 0.0.0.0:8080");
    axum::serve(listener, app).await.expect("server error");
}

fn iso_now(clock: &dyn Clock) -> String {
    chrono::DateTime::from_timestamp_millis(clock.now_ms() as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "edge-gateway",
        "version": GATEWAY_VERSION,
        "timestamp": iso_now(state.clock.as_ref()),
    }))
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "edge-gateway",
        "description": "Rate-limited API gateway and reverse proxy",
        "version": GATEWAY_VERSION,
        "routes": [
            "/health",
            "/api/services",
            "/api/version",
            "/api/echo",
            "/api/ai/*",
            "/api/*",
        ],
    }))
}

async fn services_handler() -> impl IntoResponse {
    Json(json!({
        "services": [
            {"name": "ai-proxy", "path": "/api/ai/*", "description": "Rewritten onto BACKEND_URL"},
            {"name": "echo", "path": "/api/echo", "description": "Reflects the incoming request"},
        ],
    }))
}

async fn version_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "gateway": GATEWAY_VERSION,
        "environment": state.config.environment,
        "runtime": format!("rustc/{}", option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown")),
    }))
}

async fn echo_handler(
    State(state): State<AppState>,
    Query(query): Query<std::collections::HashMap<String, String>>,
    request: Request<Body>,
) -> impl IntoResponse {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let headers = header_map_to_json(request.headers());
    let body_bytes = to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    let body = String::from_utf8_lossy(&body_bytes).to_string();

    Json(json!({
        "method": method,
        "path": path,
        "query": query,
        "headers": headers,
        "body": body,
        "timestamp": iso_now(state.clock.as_ref()),
    }))
}

async fn ai_proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let rest = request
        .uri()
        .path()
        .strip_prefix("/api/ai/")
        .unwrap_or_default();
    let upstream_path = format!("/ai/{rest}");
    forward(&state, request, &upstream_path).await
}

async fn generic_proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> impl IntoResponse {
    let upstream_path = request.uri().path().to_string();
    forward(&state, request, &upstream_path).await
}

async fn forward(state: &AppState, request: Request<Body>, upstream_path: &str) -> Response {
    let method = request.method().clone();
    let headers = request.headers().clone();
    let query = request.uri().query().map(str::to_string);
    let body_bytes = if method == Method::GET || method == Method::HEAD {
        Vec::new()
    } else {
        to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap_or_default()
            .to_vec()
    };

    let mut url = format!("{}{}", state.config.backend_url.trim_end_matches('/'), upstream_path);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(&query);
    }

    let reqwest_method =
        reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let mut builder = state.http.request(reqwest_method, &url);

    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = auth.to_str() {
            builder = builder.header(reqwest::header::AUTHORIZATION, value);
        }
    }
    if let Some(content_type) = headers.get(axum::http::header::CONTENT_TYPE) {
        if let Ok(value) = content_type.to_str() {
            builder = builder.header(reqwest::header::CONTENT_TYPE, value);
        }
    }
    if !body_bytes.is_empty() {
        builder = builder.body(body_bytes);
    }

    match builder.send().await {
        Ok(upstream_response) => {
            let status = upstream_response.status().as_u16();
            let body = upstream_response.bytes().await.unwrap_or_default();
            let mut response = Response::new(Body::from(body));
            *response.status_mut() =
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            response
                .headers_mut()
                .insert("x-upstream", HeaderValue::from_static("backend"));
            response
        }
        Err(err) => {
            let body = json!({
                "error": "Internal Server Error",
                "message": format!("upstream request failed: {err}"),
                "timestamp": iso_now(state.clock.as_ref()),
            });
            let mut response = Json(body).into_response();
            *response.status_mut() = StatusCode::BAD_GATEWAY;
            response
        }
    }
}

fn header_map_to_json(headers: &HeaderMap) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_string(), json!(value));
        }
    }
    serde_json::Value::Object(map)
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": "no route matches this request",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
