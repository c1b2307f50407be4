//! Per-user quota tracking across minute/day/month periods.
//!
//! Distinct from [`crate::quota::Quota`], which configures a single
//! rate-limiting *algorithm*. This module tracks usage against a ceiling
//! enforced over wall-clock calendar periods, rolling each counter over the
//! instant its period identifier no longer matches "now" — the same lazy,
//! read-time reset pattern the `other_examples` quota tracker uses for
//! provider rate-limit windows, adapted here to minute/day/month buckets
//! instead of provider response headers.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{KvError, Result};
use crate::kv::KvStore;

const QUOTA_TTL: Duration = Duration::from_secs(32 * 24 * 3600);

/// Per-user quota ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Requests allowed per minute.
    pub per_minute: u64,
    /// Requests allowed per calendar day (UTC).
    pub daily: u64,
    /// Requests allowed per calendar month (UTC).
    pub monthly: u64,
}

impl QuotaConfig {
    /// Build a new quota configuration.
    pub fn new(per_minute: u64, daily: u64, monthly: u64) -> Self {
        Self {
            per_minute,
            daily,
            monthly,
        }
    }
}

/// Usage against one period's ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodUsage {
    /// Requests counted in the current period.
    pub used: u64,
    /// Ceiling for the period.
    pub limit: u64,
}

/// Result of a `check_and_increment` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    /// Whether the request was admitted.
    pub allowed: bool,
    /// Minute-period usage after this check.
    pub minute: PeriodUsage,
    /// Day-period usage after this check.
    pub daily: PeriodUsage,
    /// Month-period usage after this check.
    pub monthly: PeriodUsage,
    /// Which period caused a denial, if any.
    pub exceeded_quota: Option<ExceededQuota>,
}

/// The period that first exceeded its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceededQuota {
    /// The per-minute ceiling was reached.
    Minute,
    /// The daily ceiling was reached.
    Daily,
    /// The monthly ceiling was reached.
    Monthly,
}

impl ExceededQuota {
    /// Lowercase name matching the spec's `exceededQuota` string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredState {
    minute_count: u64,
    minute_bucket_ms: u64,
    day_count: u64,
    date_iso: String,
    month_count: u64,
    month_iso: String,
}

impl StoredState {
    fn fresh(minute_bucket_ms: u64, date_iso: String, month_iso: String) -> Self {
        Self {
            minute_count: 0,
            minute_bucket_ms,
            day_count: 0,
            date_iso,
            month_count: 0,
            month_iso,
        }
    }
}

/// Tracks per-user usage across minute/day/month periods.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaManager;

impl QuotaManager {
    /// Create a new quota manager.
    pub fn new() -> Self {
        Self
    }

    fn kv_key(&self, user_id: &str) -> String {
        format!("quota:{user_id}")
    }

    /// Check `user_id`'s quota and, if allowed, increment all three
    /// counters atomically from the caller's point of view (the
    /// load-then-store itself is not atomic — see [`crate::kv::KvStore`]).
    pub async fn check_and_increment<S: KvStore>(
        &self,
        kv: &S,
        clock: &dyn Clock,
        user_id: &str,
        config: &QuotaConfig,
    ) -> Result<QuotaCheck> {
        let now = clock.now_ms();
        let minute_bucket_ms = (now / 60_000) * 60_000;
        let datetime = Utc
            .timestamp_millis_opt(now as i64)
            .single()
            .unwrap_or_else(Utc::now);
        let date_iso = datetime.format("%Y-%m-%d").to_string();
        let month_iso = datetime.format("%Y-%m").to_string();

        let key = self.kv_key(user_id);
        let bytes = kv.get(&key).await?;
        let mut state = match bytes {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| KvError::Serialization(e.to_string()))?,
            None => StoredState::fresh(minute_bucket_ms, date_iso.clone(), month_iso.clone()),
        };

        if state.minute_bucket_ms != minute_bucket_ms {
            state.minute_count = 0;
            state.minute_bucket_ms = minute_bucket_ms;
        }
        if state.date_iso != date_iso {
            state.day_count = 0;
            state.date_iso = date_iso;
        }
        if state.month_iso != month_iso {
            state.month_count = 0;
            state.month_iso = month_iso;
        }

        let exceeded = if state.minute_count >= config.per_minute {
            Some(ExceededQuota::Minute)
        } else if state.day_count >= config.daily {
            Some(ExceededQuota::Daily)
        } else if state.month_count >= config.monthly {
            Some(ExceededQuota::Monthly)
        } else {
            None
        };

        let allowed = exceeded.is_none();
        if allowed {
            state.minute_count += 1;
            state.day_count += 1;
            state.month_count += 1;
        }

        let result = QuotaCheck {
            allowed,
            minute: PeriodUsage {
                used: state.minute_count,
                limit: config.per_minute,
            },
            daily: PeriodUsage {
                used: state.day_count,
                limit: config.daily,
            },
            monthly: PeriodUsage {
                used: state.month_count,
                limit: config.monthly,
            },
            exceeded_quota: exceeded,
        };

        let bytes =
            serde_json::to_vec(&state).map_err(|e| KvError::Serialization(e.to_string()))?;
        kv.put(&key, bytes, QUOTA_TTL).await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKv;

    #[tokio::test]
    async fn minute_gate_blocks_before_daily_or_monthly() {
        let kv = MemoryKv::new();
        let clock = ManualClock::new(0);
        let manager = QuotaManager::new();
        let config = QuotaConfig::new(3, 5, 10);

        for _ in 0..3 {
            let check = manager
                .check_and_increment(&kv, &clock, "u1", &config)
                .await
                .unwrap();
            assert!(check.allowed);
        }

        let check = manager
            .check_and_increment(&kv, &clock, "u1", &config)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.exceeded_quota, Some(ExceededQuota::Minute));
        // Denial does not increment counters.
        assert_eq!(check.minute.used, 3);
    }

    #[tokio::test]
    async fn minute_rolls_over_while_daily_persists() {
        let kv = MemoryKv::new();
        let clock = ManualClock::new(0);
        let manager = QuotaManager::new();
        let config = QuotaConfig::new(3, 5, 10);

        for _ in 0..3 {
            manager
                .check_and_increment(&kv, &clock, "u1", &config)
                .await
                .unwrap();
        }

        clock.advance(60_001);
        let check = manager
            .check_and_increment(&kv, &clock, "u1", &config)
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(check.minute.used, 1);
        assert_eq!(check.daily.used, 4);
    }

    #[tokio::test]
    async fn daily_gate_trips_after_minute_resets() {
        let kv = MemoryKv::new();
        let clock = ManualClock::new(0);
        let manager = QuotaManager::new();
        let config = QuotaConfig::new(3, 5, 10);

        // Use 3 in minute 0, roll forward a minute and use 2 more to hit 5 daily.
        for _ in 0..3 {
            manager
                .check_and_increment(&kv, &clock, "u1", &config)
                .await
                .unwrap();
        }
        clock.advance(60_001);
        for _ in 0..2 {
            let check = manager
                .check_and_increment(&kv, &clock, "u1", &config)
                .await
                .unwrap();
            assert!(check.allowed);
        }

        clock.advance(60_001);
        let check = manager
            .check_and_increment(&kv, &clock, "u1", &config)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.exceeded_quota, Some(ExceededQuota::Daily));
    }
}
