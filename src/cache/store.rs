//! Success and failure stores
//!
//! Two bounded LRU maps behind one lock. Holding both under the same mutex
//! keeps the cross-store invariant atomic: a key present in the success store
//! is never present in the failure store, and vice versa.

use super::key::RequestKey;
use crate::config::CacheConfig;
use crate::types::{AudioBytes, FailureRecord};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    payload: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(payload: T, ttl: Duration) -> Self {
        Self {
            payload,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Result of a combined lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Success(AudioBytes),
    Failure(FailureRecord),
    Miss,
}

#[derive(Debug)]
struct Stores {
    success: LruCache<RequestKey, CacheEntry<AudioBytes>>,
    failure: LruCache<RequestKey, CacheEntry<FailureRecord>>,
}

/// Entry counts per store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSizes {
    pub success: usize,
    pub failure: usize,
}

#[derive(Debug)]
pub struct ResponseCache {
    stores: Mutex<Stores>,
    success_ttl: Duration,
    failure_ttl: Duration,
}

impl ResponseCache {
    pub fn new(
        success_capacity: NonZeroUsize,
        failure_capacity: NonZeroUsize,
        success_ttl: Duration,
        failure_ttl: Duration,
    ) -> Self {
        debug!(
            success_capacity = success_capacity.get(),
            failure_capacity = failure_capacity.get(),
            failure_ttl_seconds = failure_ttl.as_secs(),
            "Response cache created"
        );

        Self {
            stores: Mutex::new(Stores {
                success: LruCache::new(success_capacity),
                failure: LruCache::new(failure_capacity),
            }),
            success_ttl,
            failure_ttl,
        }
    }

    /// Build from configuration; zero capacities are clamped to one entry
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            NonZeroUsize::new(config.success_capacity).unwrap_or(NonZeroUsize::MIN),
            NonZeroUsize::new(config.failure_capacity).unwrap_or(NonZeroUsize::MIN),
            config.success_ttl(),
            config.failure_ttl(),
        )
    }

    pub fn success_ttl(&self) -> Duration {
        self.success_ttl
    }

    pub fn failure_ttl(&self) -> Duration {
        self.failure_ttl
    }

    /// Look the key up in both stores, success first. Expired entries are
    /// purged on the way and reported as a miss.
    pub fn get(&self, key: &RequestKey) -> CacheLookup {
        let now = Instant::now();
        let mut stores = self.stores.lock();

        if let Some(payload) = Self::lookup_live(&mut stores.success, key, now) {
            debug!(key = %key, "Cache HIT (success)");
            return CacheLookup::Success(payload);
        }
        if let Some(record) = Self::lookup_live(&mut stores.failure, key, now) {
            debug!(key = %key, error_class = %record.error_class, "Cache HIT (failure)");
            return CacheLookup::Failure(record);
        }

        debug!(key = %key, "Cache MISS");
        CacheLookup::Miss
    }

    pub fn get_success(&self, key: &RequestKey) -> Option<AudioBytes> {
        let now = Instant::now();
        Self::lookup_live(&mut self.stores.lock().success, key, now)
    }

    pub fn get_failure(&self, key: &RequestKey) -> Option<FailureRecord> {
        let now = Instant::now();
        Self::lookup_live(&mut self.stores.lock().failure, key, now)
    }

    /// Store a success, clearing any failure remembered for the same key
    pub fn put_success(&self, key: RequestKey, payload: AudioBytes, ttl: Duration) {
        let mut stores = self.stores.lock();
        stores.failure.pop(&key);
        debug!(key = %key, ttl_seconds = ttl.as_secs(), "Cache SET (success)");
        stores.success.put(key, CacheEntry::new(payload, ttl));
    }

    /// Store a failure, clearing any success remembered for the same key
    pub fn put_failure(&self, key: RequestKey, record: FailureRecord, ttl: Duration) {
        let mut stores = self.stores.lock();
        stores.success.pop(&key);
        debug!(
            key = %key,
            error_class = %record.error_class,
            ttl_seconds = ttl.as_secs(),
            "Cache SET (failure)"
        );
        stores.failure.put(key, CacheEntry::new(record, ttl));
    }

    /// Drop every expired entry from both stores. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut stores = self.stores.lock();

        let expired_success: Vec<RequestKey> = stores
            .success
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        let expired_failure: Vec<RequestKey> = stores
            .failure
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_success {
            stores.success.pop(key);
        }
        for key in &expired_failure {
            stores.failure.pop(key);
        }

        let evicted = expired_success.len() + expired_failure.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Expired cache entries evicted");
        }
        evicted
    }

    pub fn clear(&self) {
        let mut stores = self.stores.lock();
        stores.success.clear();
        stores.failure.clear();
    }

    pub fn sizes(&self) -> CacheSizes {
        let stores = self.stores.lock();
        CacheSizes {
            success: stores.success.len(),
            failure: stores.failure.len(),
        }
    }

    fn lookup_live<T: Clone>(
        store: &mut LruCache<RequestKey, CacheEntry<T>>,
        key: &RequestKey,
        now: Instant,
    ) -> Option<T> {
        let expired = match store.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.payload.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            store.pop(key);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ErrorClass;

    fn cache(success: usize, failure: usize) -> ResponseCache {
        ResponseCache::new(
            NonZeroUsize::new(success).unwrap(),
            NonZeroUsize::new(failure).unwrap(),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
    }

    fn key(text: &str) -> RequestKey {
        RequestKey::derive(text, "neutral")
    }

    fn audio(tag: &str) -> AudioBytes {
        AudioBytes::new(tag.as_bytes().to_vec())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_expires_after_ttl() {
        let cache = cache(4, 4);
        cache.put_success(key("a"), audio("a"), Duration::from_secs(10));
        assert_eq!(cache.get(&key("a")), CacheLookup::Success(audio("a")));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get(&key("a")), CacheLookup::Miss);
        // Lazily purged on lookup
        assert_eq!(cache.sizes().success, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_hit_until_ttl() {
        let cache = cache(4, 4);
        let record = FailureRecord::new(ErrorClass::Authentication, "401 unauthorized");
        cache.put_failure(key("a"), record.clone(), Duration::from_secs(3600));

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.get(&key("a")), CacheLookup::Failure(record));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key("a")), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_stores_are_mutually_exclusive() {
        let cache = cache(4, 4);
        let record = FailureRecord::new(ErrorClass::Resource, "voice not found");

        cache.put_failure(key("a"), record, Duration::from_secs(60));
        cache.put_success(key("a"), audio("a"), Duration::from_secs(60));
        assert!(cache.get_failure(&key("a")).is_none());
        assert_eq!(cache.sizes(), CacheSizes { success: 1, failure: 0 });

        let record = FailureRecord::new(ErrorClass::Network, "connection reset");
        cache.put_failure(key("a"), record, Duration::from_secs(60));
        assert!(cache.get_success(&key("a")).is_none());
        assert_eq!(cache.sizes(), CacheSizes { success: 0, failure: 1 });
    }

    #[tokio::test]
    async fn test_lru_eviction_respects_access_order() {
        let cache = cache(2, 2);
        cache.put_success(key("a"), audio("a"), Duration::from_secs(60));
        cache.put_success(key("b"), audio("b"), Duration::from_secs(60));

        // Touch "a" so "b" becomes least recently used
        assert!(cache.get_success(&key("a")).is_some());
        cache.put_success(key("c"), audio("c"), Duration::from_secs(60));

        assert!(cache.get_success(&key("a")).is_some());
        assert!(cache.get_success(&key("b")).is_none());
        assert!(cache.get_success(&key("c")).is_some());
        assert_eq!(cache.sizes().success, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_sweeps_both_stores() {
        let cache = cache(4, 4);
        cache.put_success(key("short"), audio("s"), Duration::from_secs(5));
        cache.put_success(key("long"), audio("l"), Duration::from_secs(500));
        cache.put_failure(
            key("fail"),
            FailureRecord::new(ErrorClass::Unknown, "boom"),
            Duration::from_secs(5),
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.evict_expired(), 2);
        assert_eq!(cache.sizes(), CacheSizes { success: 1, failure: 0 });
    }

    #[tokio::test]
    async fn test_digest_collision_is_a_miss() {
        let cache = cache(4, 4);
        let stored = key("Turn left");
        let colliding = RequestKey::from_parts(stored.as_str(), "Turn right");
        cache.put_success(stored.clone(), audio("left"), Duration::from_secs(60));

        assert_eq!(cache.get(&colliding), CacheLookup::Miss);
        assert!(cache.get_failure(&colliding).is_none());

        // Both texts can be cached side by side
        cache.put_success(colliding.clone(), audio("right"), Duration::from_secs(60));
        assert_eq!(cache.get_success(&stored), Some(audio("left")));
        assert_eq!(cache.get_success(&colliding), Some(audio("right")));
        assert_eq!(cache.sizes().success, 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache(4, 4);
        cache.put_success(key("a"), audio("a"), Duration::from_secs(60));
        cache.put_failure(
            key("b"),
            FailureRecord::new(ErrorClass::Unknown, "boom"),
            Duration::from_secs(60),
        );
        cache.clear();
        assert_eq!(cache.sizes(), CacheSizes::default());
    }
}
