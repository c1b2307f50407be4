//! State shared by the rate-limiting algorithms, serialized as the value
//! half of a `KvStore` entry.

use serde::{Deserialize, Serialize};

/// Per-key state written and read back by a rate-limiting algorithm.
///
/// Every algorithm uses a subset of these fields; the rest stay `None` and
/// are skipped on serialization so a fixed-window entry doesn't carry a
/// `timestamps` vector it never touches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LimiterState {
    /// Request count (fixed window, sliding window).
    pub count: u64,

    /// Window start timestamp (Unix milliseconds).
    pub window_start: u64,

    /// Available tokens (token bucket, leaky bucket).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<f64>,

    /// Last update timestamp (Unix milliseconds).
    pub last_update: u64,

    /// Previous window count (weighted sliding window).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_count: Option<u64>,

    /// Request timestamps still inside the window (sliding window log).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<u64>>,
}

impl LimiterState {
    /// New state for a window-counter algorithm.
    pub fn new(count: u64, window_start: u64) -> Self {
        Self {
            count,
            window_start,
            last_update: window_start,
            ..Default::default()
        }
    }

    /// New state for a token/leaky bucket.
    pub fn with_tokens(tokens: f64, last_update: u64) -> Self {
        Self {
            tokens: Some(tokens),
            last_update,
            window_start: last_update,
            ..Default::default()
        }
    }

    /// New state for a sliding window log.
    pub fn with_timestamps(timestamps: Vec<u64>) -> Self {
        let now = timestamps.last().copied().unwrap_or(0);
        Self {
            count: timestamps.len() as u64,
            window_start: now,
            last_update: now,
            timestamps: Some(timestamps),
            ..Default::default()
        }
    }

    /// Tokens, defaulting to `0.0` when unset.
    pub fn tokens_or_default(&self) -> f64 {
        self.tokens.unwrap_or(0.0)
    }

    /// Previous window count, defaulting to `0` when unset.
    pub fn prev_count_or_default(&self) -> u64 {
        self.prev_count.unwrap_or(0)
    }
}
