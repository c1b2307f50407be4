//! CORS handling for the policy pipeline.
//!
//! The gateway is meant to sit in front of a browser-facing API, so every
//! route accepts cross-origin requests; there is no per-route allow-list to
//! configure.

use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode};

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-API-Key";
const EXPOSED_HEADERS: &str =
    "X-Request-Id, X-RateLimit-Limit, X-RateLimit-Remaining, X-RateLimit-Reset";

/// Build the response to an `OPTIONS` preflight request.
pub fn preflight_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors_headers(&mut response);
    response
        .headers_mut()
        .insert("access-control-allow-methods", HeaderValue::from_static(ALLOWED_METHODS));
    response
        .headers_mut()
        .insert("access-control-allow-headers", HeaderValue::from_static(ALLOWED_HEADERS));
    response
}

/// Apply the CORS headers every response (preflight or not) carries.
pub fn apply_cors_headers(response: &mut Response<Body>) {
    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-credentials",
        HeaderValue::from_static("true"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
}
