//! Sliding Window rate limiting algorithm.
//!
//! Stores the timestamp of every request still inside the window, giving an
//! exact count with no boundary burst at the window edge. Memory scales with
//! the request rate rather than staying fixed, so it is not the right choice
//! for very high-limit routes — see `FixedWindow` for that trade-off.

use std::time::Duration;

use crate::algorithm::{timestamp_to_instant, Algorithm};
use crate::clock::Clock;
use crate::decision::{Decision, RateLimitInfo};
use crate::error::Result;
use crate::kv::{load_state, store_state, KvStore, LimiterState};
use crate::quota::Quota;

/// KV key prefix for this algorithm's state (spec §6 key layout).
pub(crate) const KEY_PREFIX: &str = "rl:sw:";

/// Sliding Window rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow;

impl SlidingWindow {
    /// Create a new Sliding Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn filter_window(&self, timestamps: &[u64], window_start: u64) -> Vec<u64> {
        timestamps
            .iter()
            .filter(|&&ts| ts >= window_start)
            .copied()
            .collect()
    }
}

impl Algorithm for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    async fn check_and_record<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> Result<Decision> {
        let now = clock.now_ms();
        let window_ms = quota.window().as_millis() as u64;
        let window_start = now.saturating_sub(window_ms);
        // ceil(windowMs / 1000) + 60s: long enough to absorb clock skew
        // between the reader and whichever node last wrote this key.
        let ttl = Duration::from_secs((window_ms + 999) / 1000 + 60);
        let limit = quota.max_requests();
        let storage_key = format!("{KEY_PREFIX}{key}");

        let current = load_state(kv, &storage_key).await?;
        let mut timestamps = current.and_then(|e| e.timestamps).unwrap_or_default();
        timestamps = self.filter_window(&timestamps, window_start);
        let current_count = timestamps.len() as u64;

        let decision = if current_count < limit {
            timestamps.push(now);
            let remaining = limit - current_count - 1;
            let reset_at = timestamp_to_instant(clock, now + window_ms);
            let info = RateLimitInfo::new(
                limit,
                remaining,
                reset_at,
                timestamp_to_instant(clock, window_start),
            )
            .with_algorithm("sliding_window");

            Decision::allowed(info)
        } else {
            let oldest = timestamps.first().copied().unwrap_or(now);
            let retry_ms = oldest + window_ms - now;
            let reset_at = timestamp_to_instant(clock, oldest + window_ms);

            let info = RateLimitInfo::new(
                limit,
                0,
                reset_at,
                timestamp_to_instant(clock, window_start),
            )
            .with_algorithm("sliding_window")
            .with_retry_after(Duration::from_millis(retry_ms));

            Decision::denied(info)
        };

        store_state(kv, &storage_key, &LimiterState::with_timestamps(timestamps), ttl).await?;
        Ok(decision)
    }

    async fn check<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> Result<Decision> {
        let now = clock.now_ms();
        let window_ms = quota.window().as_millis() as u64;
        let window_start = now.saturating_sub(window_ms);
        let limit = quota.max_requests();
        let storage_key = format!("{KEY_PREFIX}{key}");

        let entry = load_state(kv, &storage_key).await?;
        let timestamps = entry.and_then(|e| e.timestamps).unwrap_or_default();
        let filtered = self.filter_window(&timestamps, window_start);
        let current_count = filtered.len() as u64;

        let remaining = limit.saturating_sub(current_count);
        let reset_at = if let Some(&oldest) = filtered.first() {
            timestamp_to_instant(clock, oldest + window_ms)
        } else {
            timestamp_to_instant(clock, now + window_ms)
        };

        let info = RateLimitInfo::new(
            limit,
            remaining,
            reset_at,
            timestamp_to_instant(clock, window_start),
        )
        .with_algorithm("sliding_window");

        Ok(if current_count < limit {
            Decision::allowed(info)
        } else {
            let oldest = filtered.first().copied().unwrap_or(now);
            let retry_ms = oldest + window_ms - now;
            Decision::denied(info.with_retry_after(Duration::from_millis(retry_ms)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn test_sliding_window_basic() {
        let algorithm = SlidingWindow::new();
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let quota = Quota::per_minute(5);

        for i in 1..=5 {
            let decision = algorithm
                .check_and_record(&kv, &clock, "user:1", &quota)
                .await
                .unwrap();
            assert!(decision.is_allowed(), "Request {} should be allowed", i);
        }

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_denied());
    }

    #[tokio::test]
    async fn test_sliding_window_precision() {
        let algorithm = SlidingWindow::new();
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let quota = Quota::new(2, Duration::from_millis(200));

        algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_denied());

        tokio::time::sleep(Duration::from_millis(200)).await;

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }
}
