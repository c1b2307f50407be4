//! Rate limiting algorithm trait and implementations.
//!
//! This module defines the `Algorithm` trait and provides implementations
//! for the algorithms the gateway's rate limiter supports.
//!
//! # Available Algorithms
//!
//! - **Token Bucket** (default): controlled bursts with refilling tokens
//! - **Leaky Bucket** (`leaky-bucket` feature): smooth constant output rate
//! - **Sliding Window** (default): exact per-request timestamp log
//! - **Fixed Window** (default): simple counter per time bucket

#[cfg(feature = "leaky-bucket")]
mod leaky_bucket;
mod fixed_window;
mod sliding_window;
mod token_bucket;

#[cfg(feature = "leaky-bucket")]
pub use leaky_bucket::LeakyBucket;
pub use fixed_window::FixedWindow;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;

use std::future::Future;

use crate::clock::Clock;
use crate::decision::Decision;
use crate::error::Result;
use crate::kv::KvStore;
use crate::quota::Quota;

/// Rate limiting algorithm trait.
///
/// Each algorithm provides different trade-offs between accuracy, memory
/// usage, and burst handling. All implementations must be thread-safe and
/// take their notion of "now" from an injected [`Clock`] rather than reading
/// the system clock directly.
///
/// # Algorithm Comparison
///
/// | Algorithm | Accuracy | Memory | Burst | Best For |
/// |-----------|----------|--------|-------|----------|
/// | Token Bucket | High | Low | Excellent | Bursty traffic |
/// | Leaky Bucket | High | Medium | None | Smooth output |
/// | Sliding Window | Highest | Medium | Good | Precision critical |
/// | Fixed Window | Low | Low | Poor | Simple use cases |
pub trait Algorithm: Send + Sync + 'static {
    /// Get the algorithm name (for logging/metrics).
    fn name(&self) -> &'static str;

    /// Check if a request is allowed AND record it.
    ///
    /// This is the primary method for rate limiting. It checks whether the
    /// request should be allowed and, if so, records it against the quota.
    /// The load-then-store against `kv` is not atomic; see module docs on
    /// [`crate::kv::KvStore`].
    fn check_and_record<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> impl Future<Output = Result<Decision>> + Send;

    /// Check without recording (peek at current state).
    ///
    /// Useful for displaying rate limit info without consuming quota.
    fn check<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> impl Future<Output = Result<Decision>> + Send;

    /// Reset the rate limit for a key.
    fn reset<S: KvStore>(&self, kv: &S, key: &str) -> impl Future<Output = Result<()>> + Send {
        async move { kv.delete(key).await }
    }
}

/// Convert a Unix-epoch millisecond timestamp to an `Instant`, anchored at
/// the clock's current reading. Approximate, but good enough for header
/// values and comparisons that only need relative ordering.
pub(crate) fn timestamp_to_instant(clock: &dyn Clock, timestamp_ms: u64) -> std::time::Instant {
    let now = std::time::Instant::now();
    let now_ms = clock.now_ms();

    if timestamp_ms >= now_ms {
        now + std::time::Duration::from_millis(timestamp_ms - now_ms)
    } else {
        now - std::time::Duration::from_millis(now_ms - timestamp_ms)
    }
}
