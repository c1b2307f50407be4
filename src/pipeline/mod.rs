//! The gateway's fixed-order request policy: logging, CORS, client
//! identification, composite rate limiting, and authentication, wrapped as
//! a Tower [`Layer`](tower::Layer) around an inner Axum router.

mod auth;
mod cors;
mod service;

pub use auth::AuthOutcome;
pub use service::{GatewayState, PolicyLayer, PolicyService};
