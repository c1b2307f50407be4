//! Token Bucket rate limiting algorithm.

use std::time::Duration;

use crate::algorithm::{timestamp_to_instant, Algorithm};
use crate::clock::Clock;
use crate::decision::{Decision, DecisionMetadata, RateLimitInfo};
use crate::error::Result;
use crate::kv::{load_state, store_state, KvStore, LimiterState};
use crate::quota::Quota;

/// KV key prefix for plain Token Bucket state (spec §6 key layout). The
/// Adaptive controller wraps this same algorithm but writes under its own
/// `rl:adaptive:` prefix instead, so the two don't clobber each other's
/// state when scoped to the same client key.
pub(crate) const KEY_PREFIX: &str = "rl:tb:";

/// Token Bucket rate limiting algorithm.
///
/// Allows controlled bursts while enforcing an average rate limit. Tokens
/// are refilled at a constant rate up to maximum capacity. The refill
/// amount is floored to an integer number of tokens per tick so repeated
/// sub-token refills can't accumulate float drift across many small
/// requests.
#[derive(Debug, Clone, Default)]
pub struct TokenBucket;

impl TokenBucket {
    /// Create a new Token Bucket algorithm instance.
    pub fn new() -> Self {
        Self
    }

    fn calculate_refill(&self, elapsed_ms: u64, refill_rate: f64) -> f64 {
        let elapsed_secs = elapsed_ms as f64 / 1000.0;
        (elapsed_secs * refill_rate).floor()
    }

    /// Check and record with an explicit request cost, in tokens. The
    /// [`Algorithm`] trait methods call this with `cost = 1.0`; the adaptive
    /// controller calls it directly with `cost = 1 / loadFactor`. `key` is
    /// the already-namespaced KV storage key — callers are responsible for
    /// prefixing it (see [`KEY_PREFIX`] and [`crate::adaptive::KEY_PREFIX`])
    /// so that different callers of this same bucket logic don't collide.
    pub async fn check_and_record_with_cost<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
        cost: f64,
    ) -> Result<Decision> {
        let now = clock.now_ms();
        let max_tokens = quota.effective_burst() as f64;
        let refill_rate = quota.effective_refill_rate();

        // Fixed TTL rather than derived from bucket/refill: a bucket sized
        // for a slow rate shouldn't evict its state before it could ever
        // refill, so we just give every entry an hour to go cold.
        let ttl = Duration::from_secs(3600);

        let current = load_state(kv, key).await?;
        let (mut tokens, last_update) = match current {
            Some(e) => (e.tokens_or_default(), e.last_update),
            None => (max_tokens, now),
        };

        if now > last_update {
            let refill = self.calculate_refill(now - last_update, refill_rate);
            tokens = (tokens + refill).min(max_tokens);
        }

        let decision = if tokens >= cost {
            tokens -= cost;
            let info = self.build_info(tokens, quota, now, clock);
            Decision::allowed(info)
        } else {
            let mut info = self.build_info(tokens, quota, now, clock);
            let deficit = cost - tokens;
            let retry_ms = (deficit / refill_rate * 1000.0).ceil() as u64;
            info = info.with_retry_after(Duration::from_millis(retry_ms.max(1)));
            Decision::denied(info)
        };

        store_state(kv, key, &LimiterState::with_tokens(tokens, now), ttl).await?;
        Ok(decision)
    }

    fn build_info(&self, tokens: f64, quota: &Quota, now: u64, clock: &dyn Clock) -> RateLimitInfo {
        let max_tokens = quota.effective_burst();
        let remaining = tokens.floor() as u64;
        let refill_rate = quota.effective_refill_rate();

        let time_to_next_token = if tokens < 1.0 {
            ((1.0 - tokens) / refill_rate * 1000.0) as u64
        } else {
            0
        };

        let tokens_needed = max_tokens as f64 - tokens;
        let time_to_full = if tokens_needed > 0.0 {
            (tokens_needed / refill_rate * 1000.0) as u64
        } else {
            0
        };

        let reset_at = timestamp_to_instant(clock, now + time_to_full);
        let window_start = timestamp_to_instant(clock, now);

        let mut info = RateLimitInfo::new(max_tokens, remaining, reset_at, window_start)
            .with_algorithm("token_bucket")
            .with_metadata(DecisionMetadata::new().with_tokens_available(tokens));

        if remaining == 0 && time_to_next_token > 0 {
            info = info.with_retry_after(Duration::from_millis(time_to_next_token));
        }

        info
    }
}

impl Algorithm for TokenBucket {
    fn name(&self) -> &'static str {
        "token_bucket"
    }

    async fn check_and_record<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> Result<Decision> {
        let storage_key = format!("{KEY_PREFIX}{key}");
        self.check_and_record_with_cost(kv, clock, &storage_key, quota, 1.0)
            .await
    }

    async fn check<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> Result<Decision> {
        let now = clock.now_ms();
        let max_tokens = quota.effective_burst() as f64;
        let refill_rate = quota.effective_refill_rate();

        let storage_key = format!("{KEY_PREFIX}{key}");
        let entry = load_state(kv, &storage_key).await?;
        let (mut tokens, last_update) = match entry {
            Some(e) => (e.tokens_or_default(), e.last_update),
            None => (max_tokens, now),
        };

        if now > last_update {
            let refill = self.calculate_refill(now - last_update, refill_rate);
            tokens = (tokens + refill).min(max_tokens);
        }

        let info = self.build_info(tokens, quota, now, clock);

        Ok(if tokens >= 1.0 {
            Decision::allowed(info)
        } else {
            Decision::denied(info)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn test_token_bucket_basic() {
        let algorithm = TokenBucket::new();
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let quota = Quota::per_minute(5).with_burst(5);

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
    async fn test_token_bucket_burst() {
        let algorithm = TokenBucket::new();
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let quota = Quota::per_second(1).with_burst(10);

        for i in 1..=10 {
            let decision = algorithm
                .check_and_record(&kv, &clock, "user:1", &quota)
                .await
                .unwrap();
            assert!(decision.is_allowed(), "Burst request {} should be allowed", i);
        }

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_denied());
    }

    #[tokio::test]
    async fn test_token_bucket_refill() {
        let algorithm = TokenBucket::new();
        let kv = MemoryKv::new();
        let clock = SystemClock;
        let quota = Quota::per_second(10).with_burst(1);

        algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_denied());

        tokio::time::sleep(Duration::from_millis(150)).await;

        let decision = algorithm
            .check_and_record(&kv, &clock, "user:1", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }
}
