//! Decision cache for policy-engine authorization checks.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Default maximum number of entries in the cache.
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Interval between automatic eviction sweeps (triggered lazily on `set()`).
const EVICTION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// A cache key for authorization decisions.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

impl CacheKey {
    pub fn new(subject: &str, relation: &str, object: &str) -> Self {
        Self {
            subject: subject.to_string(),
            relation: relation.to_string(),
            object: object.to_string(),
        }
    }
}

/// A cached authorization decision with expiration time.
struct CachedDecision {
    allowed: bool,
    expires_at: Instant,
}

/// Thread-safe decision cache with TTL and maximum capacity.
///
/// Expired entries are evicted lazily: a sweep runs at most once per minute,
/// triggered by `set()` calls, keeping the memory footprint bounded without a
/// dedicated eviction task.
///
/// When the cache reaches `max_entries`, expired entries are evicted first.
/// If the cache is still full afterwards, the new entry is **not** inserted
/// (fail-open: the backend is queried every time).
pub struct DecisionCache {
    entries: DashMap<CacheKey, CachedDecision>,
    ttl: Duration,
    max_entries: usize,
    len: AtomicUsize,
    last_eviction: std::sync::Mutex<Instant>,
}

impl DecisionCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self::with_capacity(ttl_secs, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
            len: AtomicUsize::new(0),
            last_eviction: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<bool> {
        self.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.allowed)
            } else {
                None
            }
        })
    }

    pub fn set(&self, key: CacheKey, allowed: bool) {
        self.maybe_evict();

        if self.len.load(Ordering::Relaxed) >= self.max_entries {
            self.evict_expired();
            if self.len.load(Ordering::Relaxed) >= self.max_entries {
                return;
            }
        }

        let was_absent = self
            .entries
            .insert(
                key,
                CachedDecision {
                    allowed,
                    expires_at: Instant::now() + self.ttl,
                },
            )
            .is_none();
        if was_absent {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        if self.entries.remove(key).is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Invalidate all cache entries for a given object (e.g. `role:R1`),
    /// used when the `Materializer` writes or deletes a tuple for it.
    pub fn invalidate_object(&self, object: &str) {
        self.entries.retain(|k, _| {
            let keep = k.object != object;
            if !keep {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            keep
        });
    }

    /// Invalidate all cache entries for a given subject (e.g. `user:U1`).
    pub fn invalidate_user(&self, subject: &str) {
        self.entries.retain(|k, _| {
            let keep = k.subject != subject;
            if !keep {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            keep
        });
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.len.store(0, Ordering::Relaxed);
    }

    pub fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, v| {
            let keep = v.expires_at > now;
            if !keep {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            keep
        });
        if let Ok(mut last) = self.last_eviction.lock() {
            *last = Instant::now();
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_evict(&self) {
        let should_evict = self
            .last_eviction
            .lock()
            .map(|last| last.elapsed() >= EVICTION_CHECK_INTERVAL)
            .unwrap_or(false);
        if should_evict {
            self.evict_expired();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_within_ttl() {
        let cache = DecisionCache::new(60);
        let key = CacheKey::new("user:alice", "member", "role:R1");
        cache.set(key.clone(), true);
        assert_eq!(cache.get(&key), Some(true));
    }

    #[test]
    fn invalidate_object_clears_only_matching_entries() {
        let cache = DecisionCache::new(60);
        cache.set(CacheKey::new("user:alice", "member", "role:R1"), true);
        cache.set(CacheKey::new("user:bob", "member", "role:R2"), true);

        cache.invalidate_object("role:R1");

        assert!(cache.get(&CacheKey::new("user:alice", "member", "role:R1")).is_none());
        assert_eq!(cache.get(&CacheKey::new("user:bob", "member", "role:R2")), Some(true));
    }

    #[test]
    fn invalidate_user_clears_only_matching_entries() {
        let cache = DecisionCache::new(60);
        cache.set(CacheKey::new("user:alice", "member", "role:R1"), true);
        cache.set(CacheKey::new("user:bob", "member", "role:R1"), false);

        cache.invalidate_user("user:alice");

        assert!(cache.get(&CacheKey::new("user:alice", "member", "role:R1")).is_none());
        assert_eq!(cache.get(&CacheKey::new("user:bob", "member", "role:R1")), Some(false));
    }
}
