// src/services/cache.rs
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

/// A cached value and its optional expiry. Entries are evicted lazily on
/// read; there is no background sweeper, so the store grows with the set
/// of distinct keys. Accepted limitation for an in-process cache that only
/// memoizes idempotent recomputations.
struct CacheEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process result cache for provider and analytics calls.
///
/// Every fault (lock poisoning, serialization, stale shape) is treated as
/// a miss and logged. Callers always get a valid result, computed fresh if
/// the cache cannot help. Concurrent writes to one key are last-writer-wins,
/// which is fine because values are deterministic functions of the key.
pub struct ResultCache {
    store: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    pub fn new() -> Self {
        ResultCache {
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Derive a cache key from a namespace and the full structural
    /// serialization of the call arguments. Two distinct argument sets can
    /// never share a key. Returns None when the arguments fail to
    /// serialize; callers then skip caching for that request.
    pub fn key<A: Serialize>(namespace: &str, args: &A) -> Option<String> {
        match serde_json::to_string(args) {
            Ok(serialized) => Some(format!("{}:{}", namespace, serialized)),
            Err(e) => {
                warn!("Failed to build cache key for '{}': {}", namespace, e);
                None
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let mut store = match self.store.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Cache lock poisoned, treating lookup as a miss");
                return None;
            }
        };
        let expired = match store.get(key) {
            Some(entry) => match entry.expires_at {
                Some(expires_at) => Utc::now() > expires_at,
                None => false,
            },
            None => return None,
        };
        if expired {
            store.remove(key);
            debug!("Cache entry expired: {}", key);
            return None;
        }
        store.get(key).map(|entry| entry.value.clone())
    }

    fn insert<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: Option<i64>) {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize value for cache key {}: {}", key, e);
                return;
            }
        };
        let expires_at = ttl_seconds.map(|ttl| Utc::now() + Duration::seconds(ttl));
        match self.store.lock() {
            Ok(mut store) => {
                store.insert(key.to_string(), CacheEntry { value: json, expires_at });
            }
            Err(_) => warn!("Cache lock poisoned, dropping write for {}", key),
        }
    }

    /// Return the cached value for `key` if present and unexpired,
    /// otherwise run `compute`, store its result with the given TTL
    /// (no expiry when `ttl_seconds` is None) and return it.
    ///
    /// The lock is never held across `compute`, so two concurrent misses
    /// may both compute; the second write simply wins.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: Option<i64>,
        compute: F,
    ) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(raw) = self.lookup(key) {
            match serde_json::from_value(raw) {
                Ok(value) => {
                    debug!("Cache hit: {}", key);
                    return value;
                }
                Err(e) => debug!("Discarding undecodable cache entry for {}: {}", key, e),
            }
        }
        let value = compute().await;
        self.insert(key, &value, ttl_seconds);
        value
    }

    /// Same contract for fallible computations. Only Ok results are
    /// stored, so an upstream failure is never served back from cache.
    pub async fn get_or_try_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: Option<i64>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(raw) = self.lookup(key) {
            match serde_json::from_value(raw) {
                Ok(value) => {
                    debug!("Cache hit: {}", key);
                    return Ok(value);
                }
                Err(e) => debug!("Discarding undecodable cache entry for {}: {}", key, e),
            }
        }
        let value = compute().await?;
        self.insert(key, &value, ttl_seconds);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_call_within_ttl_skips_compute() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute("answer", Some(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                42_i64
            })
            .await;
        let second = cache
            .get_or_compute("answer", Some(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                42_i64
            })
            .await;

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        // ttl of zero expires as soon as the clock ticks past the write
        for _ in 0..2 {
            let value = cache
                .get_or_compute("ephemeral", Some(0), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "fresh".to_string()
                })
                .await;
            assert_eq!(value, "fresh");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn entry_without_ttl_never_expires() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            cache
                .get_or_compute("pinned", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    1_u32
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached_but_later_successes_are() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        let failed: Result<u32, String> = cache
            .get_or_try_compute("flaky", Some(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("upstream down".to_string())
            })
            .await;
        assert!(failed.is_err());

        let recovered: Result<u32, String> = cache
            .get_or_try_compute("flaky", Some(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(recovered, Ok(7));

        let cached: Result<u32, String> = cache
            .get_or_try_compute("flaky", Some(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;
        assert_eq!(cached, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn keys_are_structural_not_truncated() {
        // adjacent argument tuples must not collide
        let a = ResultCache::key("f", &(12, 3)).unwrap();
        let b = ResultCache::key("f", &(1, 23)).unwrap();
        assert_ne!(a, b);

        let c = ResultCache::key("price", &"AAPL").unwrap();
        let d = ResultCache::key("price", &("AAPL", 30)).unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn key_is_stable_for_equal_args() {
        let a = ResultCache::key("historical", &("MSFT", 30)).unwrap();
        let b = ResultCache::key("historical", &("MSFT", 30)).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_keys_compute_independently() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        for ticker in ["AAPL", "MSFT"] {
            let key = ResultCache::key("price", &ticker).unwrap();
            let value = cache
                .get_or_compute(&key, Some(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ticker.to_string()
                })
                .await;
            assert_eq!(value, ticker);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
