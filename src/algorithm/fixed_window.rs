//! Fixed Window rate limiting algorithm.
//!
//! Simplest of the counter-based algorithms: a single counter per window
//! bucket, reset whenever the bucket changes. Cheap, but two bursts either
//! side of a window boundary can momentarily let through close to double
//! the configured limit.

use std::time::Duration;

use crate::algorithm::{timestamp_to_instant, Algorithm};
use crate::clock::Clock;
use crate::decision::{Decision, RateLimitInfo};
use crate::error::Result;
use crate::kv::{load_state, store_state, KvStore, LimiterState};
use crate::quota::Quota;

/// Fixed Window rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct FixedWindow;

impl FixedWindow {
    /// Create a new Fixed Window algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn window_start(&self, now: u64, window_ms: u64) -> u64 {
        (now / window_ms) * window_ms
    }
}

impl Algorithm for FixedWindow {
    fn name(&self) -> &'static str {
        "fixed_window"
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
        let window_start = self.window_start(now, window_ms);
        let ttl = Duration::from_millis(window_ms * 2);
        let limit = quota.max_requests();
        // Spec §6 key layout: the window start is part of the key itself,
        // not just a shared prefix, so each window bucket gets its own slot
        // and TTL expiry does the resetting instead of a stored comparison.
        let storage_key = format!("rl:{key}:{window_start}");

        let current = load_state(kv, &storage_key).await?;
        let count = match &current {
            Some(e) if e.window_start == window_start => e.count,
            _ => 0,
        };

        let decision = if count < limit {
            let remaining = limit - count - 1;
            let reset_at = timestamp_to_instant(clock, window_start + window_ms);
            let info = RateLimitInfo::new(
                limit,
                remaining,
                reset_at,
                timestamp_to_instant(clock, window_start),
            )
            .with_algorithm("fixed_window");

            store_state(
                kv,
                &storage_key,
                &LimiterState::new(count + 1, window_start),
                ttl,
            )
            .await?;
            Decision::allowed(info)
        } else {
            let reset_at = timestamp_to_instant(clock, window_start + window_ms);
            let retry_after = Duration::from_millis(window_start + window_ms - now);
            let info = RateLimitInfo::new(
                limit,
                0,
                reset_at,
                timestamp_to_instant(clock, window_start),
            )
            .with_algorithm("fixed_window")
            .with_retry_after(retry_after);

            Decision::denied(info)
        };

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
        let window_start = self.window_start(now, window_ms);
        let limit = quota.max_requests();
        let storage_key = format!("rl:{key}:{window_start}");

        let current = load_state(kv, &storage_key).await?;
        let count = match &current {
            Some(e) if e.window_start == window_start => e.count,
            _ => 0,
        };

        let remaining = limit.saturating_sub(count);
        let reset_at = timestamp_to_instant(clock, window_start + window_ms);
        let info = RateLimitInfo::new(
            limit,
            remaining,
            reset_at,
            timestamp_to_instant(clock, window_start),
        )
        .with_algorithm("fixed_window");

        Ok(if count < limit {
            Decision::allowed(info)
        } else {
            let retry_after = Duration::from_millis(window_start + window_ms - now);
            Decision::denied(info.with_retry_after(retry_after))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let algorithm = FixedWindow::new();
        let kv = MemoryKv::new();
        let clock = ManualClock::new(0);
        let quota = Quota::per_minute(3);

        for i in 1..=3 {
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
    }

    #[tokio::test]
    async fn resets_on_new_window() {
        let algorithm = FixedWindow::new();
        let kv = MemoryKv::new();
        let clock = ManualClock::new(0);
        let quota = Quota::per_minute(1);

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed());

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_denied());

        clock.advance(60_001);

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }
}
