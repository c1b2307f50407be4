//! In-process `KvStore` with automatic garbage collection.
//!
//! Uses `DashMap` for concurrent access, the same shape as a distributed
//! cache client without the network round trip — useful for tests, single-
//! instance deployments, and as the reference backend other adapters are
//! measured against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Result;
use crate::kv::KvStore;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_millis() as u64
}

/// Garbage collection interval configuration.
#[derive(Debug, Clone)]
pub enum GcInterval {
    /// Run GC every N requests.
    Requests(u64),
    /// Run GC at fixed time intervals via a background task.
    Duration(Duration),
    /// Disable automatic GC; caller drives it via `run_gc`.
    Manual,
}

impl Default for GcInterval {
    fn default() -> Self {
        Self::Requests(10_000)
    }
}

/// Garbage collection configuration.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// When to trigger GC.
    pub interval: GcInterval,
    /// Entries untouched for longer than this are swept even if their TTL
    /// hasn't technically elapsed yet, bounding memory under clock skew.
    pub max_age: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: GcInterval::default(),
            max_age: Duration::from_secs(3600),
        }
    }
}

impl GcConfig {
    /// GC triggered every `count` requests.
    pub fn on_requests(count: u64) -> Self {
        Self {
            interval: GcInterval::Requests(count),
            ..Default::default()
        }
    }

    /// GC triggered on a fixed background timer.
    pub fn on_duration(interval: Duration) -> Self {
        Self {
            interval: GcInterval::Duration(interval),
            ..Default::default()
        }
    }

    /// No automatic GC.
    pub fn manual() -> Self {
        Self {
            interval: GcInterval::Manual,
            ..Default::default()
        }
    }

    /// Override the max entry age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

#[derive(Debug, Clone)]
struct Slot {
    bytes: Vec<u8>,
    expires_at: u64,
    last_touched: u64,
}

/// In-memory `KvStore` backed by a `DashMap`.
pub struct MemoryKv {
    data: DashMap<String, Slot>,
    gc_config: GcConfig,
    request_count: AtomicU64,
    gc_lock: Mutex<()>,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for MemoryKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKv")
            .field("entries", &self.data.len())
            .field("gc_config", &self.gc_config)
            .finish()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    /// New store with the default GC configuration (every 10,000 puts).
    pub fn new() -> Self {
        Self::with_gc(GcConfig::default())
    }

    /// New store with a custom GC configuration.
    pub fn with_gc(gc_config: GcConfig) -> Self {
        let store = Self {
            data: DashMap::new(),
            gc_config: gc_config.clone(),
            request_count: AtomicU64::new(0),
            gc_lock: Mutex::new(()),
            shutdown: Arc::new(Notify::new()),
        };

        if let GcInterval::Duration(interval) = gc_config.interval {
            store.start_gc_task(interval);
        }

        store
    }

    fn start_gc_task(&self, interval: Duration) {
        let data = self.data.clone();
        let max_age = self.gc_config.max_age;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        sweep(&data, max_age);
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
    }

    /// Run garbage collection immediately.
    pub async fn run_gc(&self) {
        sweep(&self.data, self.gc_config.max_age);
    }

    /// Number of entries currently stored (expired or not).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.data.clear();
    }

    fn maybe_run_gc(&self) {
        if let GcInterval::Requests(threshold) = self.gc_config.interval {
            let count = self.request_count.fetch_add(1, Ordering::Relaxed);
            if threshold > 0 && count % threshold == 0 && count > 0 {
                if let Some(_guard) = self.gc_lock.try_lock() {
                    sweep(&self.data, self.gc_config.max_age);
                }
            }
        }
    }
}

impl Drop for MemoryKv {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

fn sweep(data: &DashMap<String, Slot>, max_age: Duration) {
    let now = now_ms();
    let cutoff = now.saturating_sub(max_age.as_millis() as u64);
    data.retain(|_, slot| slot.expires_at > now || slot.last_touched > cutoff);
}

impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.maybe_run_gc();
        let now = now_ms();
        if let Some(slot) = self.data.get(key) {
            if slot.expires_at > now {
                return Ok(Some(slot.bytes.clone()));
            }
            drop(slot);
            self.data.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.maybe_run_gc();
        let now = now_ms();
        self.data.insert(
            key.to_string(),
            Slot {
                bytes: value,
                expires_at: now + ttl.as_millis() as u64,
                last_touched: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let kv = MemoryKv::new();
        kv.put("k", b"hello".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let kv = MemoryKv::new();
        kv.put("k", b"v".to_vec(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let kv = MemoryKv::new();
        kv.put("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        kv.delete("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn manual_gc_sweeps_stale_entries() {
        let kv = MemoryKv::with_gc(GcConfig::manual().with_max_age(Duration::from_millis(5)));
        kv.put("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        kv.run_gc().await;
        assert!(kv.is_empty());
    }
}
