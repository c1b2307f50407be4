//! Adaptive rate limiter: rescales Token Bucket cost under load.
//!
//! Wraps a [`TokenBucket`] by value (not by trait object — there is only
//! ever one concrete limiter being adapted, so no dynamic dispatch is
//! needed). An operator task periodically calls `update_load_factor` with
//! current/max load; every subsequent `check` charges each request
//! `1 / loadFactor` tokens instead of `1`, so the effective throughput
//! shrinks as load rises without touching the configured quota.

use crate::algorithm::TokenBucket;
use crate::clock::Clock;
use crate::decision::Decision;
use crate::error::Result;
use crate::kv::KvStore;
use crate::quota::Quota;

/// Fixed KV key the current load factor is stored under. Shared across all
/// clients — the adaptive controller reacts to aggregate load, not
/// per-client load.
pub const LOAD_FACTOR_KEY: &str = "rl:load-factor";

/// KV key prefix for this controller's per-client bucket state (spec §6 key
/// layout), distinct from a plain [`TokenBucket`]'s `rl:tb:` so the two
/// don't collide if both are scoped to the same client key.
pub(crate) const KEY_PREFIX: &str = "rl:adaptive:";

const MIN_LOAD_FACTOR: f64 = 0.2;
const MAX_LOAD_FACTOR: f64 = 2.0;
const DEFAULT_LOAD_FACTOR: f64 = 1.0;
const LOAD_FACTOR_TTL: std::time::Duration = std::time::Duration::from_secs(300);

/// Map a load percentage (`currentLoad / maxLoad`) to a load factor.
///
/// | loadPercent | loadFactor |
/// |-------------|-----------|
/// | > 0.9       | 0.2       |
/// | > 0.7       | 0.5       |
/// | > 0.5       | 0.75      |
/// | 0.3 – 0.5   | 1.0       |
/// | < 0.3       | 2.0       |
fn load_factor_for(load_percent: f64) -> f64 {
    let factor = if load_percent > 0.9 {
        0.2
    } else if load_percent > 0.7 {
        0.5
    } else if load_percent > 0.5 {
        0.75
    } else if load_percent >= 0.3 {
        1.0
    } else {
        2.0
    };
    factor.clamp(MIN_LOAD_FACTOR, MAX_LOAD_FACTOR)
}

/// Token-bucket limiter whose effective request cost adapts to reported
/// system load.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveController {
    bucket: TokenBucket,
}

impl AdaptiveController {
    /// Create a new adaptive controller wrapping a fresh Token Bucket.
    pub fn new() -> Self {
        Self {
            bucket: TokenBucket::new(),
        }
    }

    /// Recompute and persist the load factor from a current/max load pair.
    /// Typically called on a periodic operator task, not per-request.
    pub async fn update_load_factor<S: KvStore>(
        &self,
        kv: &S,
        current_load: f64,
        max_load: f64,
    ) -> Result<f64> {
        let load_percent = if max_load > 0.0 {
            current_load / max_load
        } else {
            0.0
        };
        let factor = load_factor_for(load_percent);
        kv.put(
            LOAD_FACTOR_KEY,
            factor.to_string().into_bytes(),
            LOAD_FACTOR_TTL,
        )
        .await?;
        Ok(factor)
    }

    async fn current_load_factor<S: KvStore>(&self, kv: &S) -> Result<f64> {
        match kv.get(LOAD_FACTOR_KEY).await? {
            Some(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                Ok(text
                    .parse::<f64>()
                    .unwrap_or(DEFAULT_LOAD_FACTOR)
                    .clamp(MIN_LOAD_FACTOR, MAX_LOAD_FACTOR))
            }
            None => Ok(DEFAULT_LOAD_FACTOR),
        }
    }

    /// Check and record one request, charging `1 / loadFactor` tokens.
    pub async fn check<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        key: &str,
        quota: &Quota,
    ) -> Result<Decision> {
        let load_factor = self.current_load_factor(kv).await?;
        let cost = 1.0 / load_factor;
        let storage_key = format!("{KEY_PREFIX}{key}");
        self.bucket
            .check_and_record_with_cost(kv, clock, &storage_key, quota, cost)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKv;

    #[test]
    fn load_factor_table_matches_thresholds() {
        assert_eq!(load_factor_for(0.95), 0.2);
        assert_eq!(load_factor_for(0.8), 0.5);
        assert_eq!(load_factor_for(0.6), 0.75);
        assert_eq!(load_factor_for(0.4), 1.0);
        assert_eq!(load_factor_for(0.1), 2.0);
    }

    #[tokio::test]
    async fn high_load_shrinks_effective_burst() {
        let kv = MemoryKv::new();
        let clock = ManualClock::new(0);
        let controller = AdaptiveController::new();
        let quota = Quota::per_second(10).with_burst(100);

        controller.update_load_factor(&kv, 95.0, 100.0).await.unwrap();

        let mut allowed = 0;
        loop {
            let decision = controller
                .check(&kv, &clock, "user:1", &quota)
                .await
                .unwrap();
            if decision.is_allowed() {
                allowed += 1;
            } else {
                break;
            }
        }
        // loadFactor 0.2 => cost 5 => 100 tokens / 5 = 20 requests.
        assert_eq!(allowed, 20);
    }
}
