//! Byte-oriented key/value abstraction backing every rate limiter.
//!
//! Unlike a cache client with atomic counters or compare-and-swap, a
//! `KvStore` only promises `get`/`put`/`delete` on opaque bytes. Each
//! algorithm loads its own state, mutates it locally, and writes it back —
//! there is no cross-operation atomicity. Two concurrent requests against the
//! same key can race and one update can be lost; callers accept this in
//! exchange for a KV adapter that fits any backend (in-process map, Redis,
//! memcached, a sharded cache) without needing backend-specific primitives.

mod entry;
mod memory;

pub use entry::LimiterState;
pub use memory::{GcConfig, GcInterval, MemoryKv};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Minimal async key/value store used by rate limiters, quota tracking, and
/// the adaptive controller.
///
/// # Required Operations
///
/// - `get`: fetch the raw bytes stored at a key, if present and unexpired.
/// - `put`: store raw bytes under a key with a TTL.
/// - `delete`: remove a key.
///
/// There is deliberately no `increment` or `compare_and_swap`: backends are
/// free to be as simple as a `HashMap` behind a mutex.
pub trait KvStore: Send + Sync + 'static {
    /// Fetch the bytes stored at `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store `value` under `key`, expiring after `ttl`.
    fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> impl Future<Output = Result<()>> + Send;

    /// Remove `key`. Succeeds even if the key was never set.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        (**self).put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}

impl<S: KvStore + ?Sized> KvStore for Box<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        (**self).put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}

/// Load and deserialize a [`LimiterState`] from a `KvStore`, returning
/// `Ok(None)` for a missing key and a [`crate::error::KvError::Serialization`]
/// for bytes that don't decode.
pub async fn load_state<S: KvStore>(kv: &S, key: &str) -> Result<Option<LimiterState>> {
    match kv.get(key).await? {
        Some(bytes) => {
            let state = serde_json::from_slice(&bytes)
                .map_err(|e| crate::error::KvError::Serialization(e.to_string()))?;
            Ok(Some(state))
        }
        None => Ok(None),
    }
}

/// Serialize and store a [`LimiterState`] under `key` with the given TTL.
pub async fn store_state<S: KvStore>(
    kv: &S,
    key: &str,
    state: &LimiterState,
    ttl: Duration,
) -> Result<()> {
    let bytes = serde_json::to_vec(state)
        .map_err(|e| crate::error::KvError::Serialization(e.to_string()))?;
    kv.put(key, bytes, ttl).await
}
