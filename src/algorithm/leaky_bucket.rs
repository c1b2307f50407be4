//! Leaky Bucket rate limiting algorithm.
//!
//! Smooths out bursty traffic by processing requests at a constant rate,
//! like water leaking from a bucket.

use std::time::Duration;

use crate::algorithm::{timestamp_to_instant, Algorithm};
use crate::clock::Clock;
use crate::decision::{Decision, DecisionMetadata, RateLimitInfo};
use crate::error::Result;
use crate::kv::{load_state, store_state, KvStore, LimiterState};
use crate::quota::Quota;

/// KV key prefix for this algorithm's state (spec §6 key layout).
pub(crate) const KEY_PREFIX: &str = "rl:lb:";

/// Leaky Bucket rate limiting algorithm.
#[derive(Debug, Clone, Default)]
pub struct LeakyBucket;

impl LeakyBucket {
    /// Create a new Leaky Bucket algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn calculate_leak(&self, elapsed_ms: u64, leak_rate: f64) -> f64 {
        let elapsed_secs = elapsed_ms as f64 / 1000.0;
        elapsed_secs * leak_rate
    }
}

impl Algorithm for LeakyBucket {
    fn name(&self) -> &'static str {
        "leaky_bucket"
    }

    async fn check_and_record<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> Result<Decision> {
        let now = clock.now_ms();
        let max_level = quota.effective_burst() as f64;
        let leak_rate = quota.effective_refill_rate();

        let ttl_ms = ((max_level / leak_rate) * 1000.0 * 2.0) as u64;
        let ttl = Duration::from_millis(ttl_ms.max(1000));
        let storage_key = format!("{KEY_PREFIX}{key}");

        let current = load_state(kv, &storage_key).await?;
        let (mut level, last_update) = match current {
            Some(e) => (e.tokens_or_default(), e.last_update),
            None => (0.0, now),
        };

        if now > last_update {
            let leaked = self.calculate_leak(now - last_update, leak_rate);
            level = (level - leaked).max(0.0);
        }

        let decision = if level + 1.0 <= max_level {
            level += 1.0;
            let remaining = (max_level - level).floor() as u64;
            let drain_time = (level / leak_rate * 1000.0) as u64;
            let reset_at = timestamp_to_instant(clock, now + drain_time);

            let info = RateLimitInfo::new(
                max_level as u64,
                remaining,
                reset_at,
                timestamp_to_instant(clock, now),
            )
            .with_algorithm("leaky_bucket")
            .with_metadata(DecisionMetadata::new().with_tokens_available(max_level - level));

            Decision::allowed(info)
        } else {
            let wait_ms = ((level + 1.0 - max_level) / leak_rate * 1000.0) as u64;
            let reset_at = timestamp_to_instant(clock, now + wait_ms);

            let info = RateLimitInfo::new(
                max_level as u64,
                0,
                reset_at,
                timestamp_to_instant(clock, now),
            )
            .with_algorithm("leaky_bucket")
            .with_retry_after(Duration::from_millis(wait_ms));

            Decision::denied(info)
        };

        store_state(kv, &storage_key, &LimiterState::with_tokens(level, now), ttl).await?;
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
        let max_level = quota.effective_burst() as f64;
        let leak_rate = quota.effective_refill_rate();
        let storage_key = format!("{KEY_PREFIX}{key}");

        let entry = load_state(kv, &storage_key).await?;
        let (mut level, last_update) = match entry {
            Some(e) => (e.tokens_or_default(), e.last_update),
            None => (0.0, now),
        };

        if now > last_update {
            let leaked = self.calculate_leak(now - last_update, leak_rate);
            level = (level - leaked).max(0.0);
        }

        let remaining = (max_level - level).floor() as u64;
        let drain_time = (level / leak_rate * 1000.0) as u64;
        let reset_at = timestamp_to_instant(clock, now + drain_time);

        let info = RateLimitInfo::new(
            max_level as u64,
            remaining,
            reset_at,
            timestamp_to_instant(clock, now),
        )
        .with_algorithm("leaky_bucket");

        Ok(if level + 1.0 <= max_level {
            Decision::allowed(info)
        } else {
            let wait_ms = ((level + 1.0 - max_level) / leak_rate * 1000.0) as u64;
            Decision::denied(info.with_retry_after(Duration::from_millis(wait_ms)))
        })
    }
}
