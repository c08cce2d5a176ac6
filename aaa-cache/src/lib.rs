//! TTL cache adapter.
//!
//! Generalizes two shapes seen in the teacher corpus:
//! `r2e-cache`'s `CacheStore` trait (pluggable backend, `Bytes` payloads,
//! `remove_by_prefix`) and `r2e-openfga`'s `DecisionCache` (lazy eviction
//! sweep gated by an interval, not a background task).
//!
//! Consumers needing typed values build on [`TypedCache`], which
//! (de)serializes through `serde_json` on top of a [`CacheBackend`].

use bytes::Bytes;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Pluggable cache backend.
///
/// Implement this to swap the in-memory default for Redis, Memcached, etc.
/// `remove_by_prefix` is the operation `Inheritance`'s cache-invalidation
/// triggers rely on (see `spec.md` §4.3).
pub trait CacheBackend: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Option<Bytes>> + Send + 'a>>;
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
    fn remove<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
    fn remove_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
    fn clear(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
    /// Current number of live (possibly-expired, not yet swept) entries.
    fn len(&self) -> usize;
}

/// Default in-memory backend, backed by `DashMap`.
///
/// Entries are evicted lazily on `get` (expired-on-read) plus a periodic
/// sweep triggered from `set`, at most once per [`InMemoryCache::EVICTION_CHECK_INTERVAL`] —
/// the same "no dedicated eviction task" tradeoff `r2e-openfga::DecisionCache`
/// makes.
pub struct InMemoryCache {
    entries: DashMap<String, (Bytes, Instant, Duration)>,
    len: AtomicUsize,
    last_sweep: Mutex<Instant>,
}

impl InMemoryCache {
    const EVICTION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            len: AtomicUsize::new(0),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    fn maybe_sweep(&self) {
        let should = self
            .last_sweep
            .lock()
            .map(|last| last.elapsed() >= Self::EVICTION_CHECK_INTERVAL)
            .unwrap_or(false);
        if should {
            self.evict_expired();
        }
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, inserted, ttl)| {
            let keep = inserted.elapsed() < *ttl;
            if !keep {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            let _ = now;
            keep
        });
        if let Ok(mut last) = self.last_sweep.lock() {
            *last = Instant::now();
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Option<Bytes>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(entry) = self.entries.get(key) {
                let (val, inserted, ttl) = entry.value();
                if inserted.elapsed() < *ttl {
                    return Some(val.clone());
                }
                drop(entry);
                if self.entries.remove(key).is_some() {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                }
            }
            None
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.maybe_sweep();
            let was_absent = self
                .entries
                .insert(key.to_string(), (value, Instant::now(), ttl))
                .is_none();
            if was_absent {
                self.len.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if self.entries.remove(key).is_some() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
        })
    }

    fn remove_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.entries.retain(|k, _| {
                let keep = !k.starts_with(prefix);
                if !keep {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                }
                keep
            });
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.entries.clear();
            self.len.store(0, Ordering::Relaxed);
        })
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

/// Typed convenience wrapper over a [`CacheBackend`], (de)serializing
/// through `serde_json`.
///
/// Deserialization failures are treated as cache misses (a stale or
/// foreign-format entry should never fail the caller — see `spec.md` §9,
/// "never rely on the cache for correctness; only for throughput").
#[derive(Clone)]
pub struct TypedCache {
    backend: Arc<dyn CacheBackend>,
}

impl TypedCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCache::new()))
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.backend.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(key, error = %err, "cache entry failed to deserialize, treating as miss");
                None
            }
        }
    }

    pub async fn set<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.backend.set(key, Bytes::from(bytes), ttl).await,
            Err(err) => tracing::warn!(key, error = %err, "failed to serialize value for cache"),
        }
    }

    pub async fn delete(&self, key: &str) {
        self.backend.remove(key).await
    }

    pub async fn delete_prefix(&self, prefix: &str) {
        self.backend.remove_by_prefix(prefix).await
    }

    pub async fn clear(&self) {
        self.backend.clear().await
    }

    pub fn len(&self) -> usize {
        self.backend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = TypedCache::in_memory();
        let w = Widget { name: "x".into(), count: 3 };
        cache.set("k1", &w, Duration::from_secs(60)).await;
        let got: Option<Widget> = cache.get("k1").await;
        assert_eq!(got, Some(w));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = TypedCache::in_memory();
        cache.set("k1", &42u32, Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let got: Option<u32> = cache.get("k1").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn prefix_delete_removes_matching_keys_only() {
        let cache = TypedCache::in_memory();
        cache.set("org:1:user:a:effective_roles", &1u32, Duration::from_secs(60)).await;
        cache.set("org:1:user:b:effective_roles", &2u32, Duration::from_secs(60)).await;
        cache.set("org:2:user:a:effective_roles", &3u32, Duration::from_secs(60)).await;

        cache.delete_prefix("org:1:").await;

        assert_eq!(cache.get::<u32>("org:1:user:a:effective_roles").await, None);
        assert_eq!(cache.get::<u32>("org:1:user:b:effective_roles").await, None);
        assert_eq!(cache.get::<u32>("org:2:user:a:effective_roles").await, Some(3));
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = TypedCache::in_memory();
        cache.set("a", &1u32, Duration::from_secs(60)).await;
        cache.set("b", &2u32, Duration::from_secs(60)).await;
        assert_eq!(cache.len(), 2);
        cache.clear().await;
        assert!(cache.is_empty());
    }
}
