//! Fail-open JSON cache in front of the store.
//!
//! [`Cache::with_cache`] returns a fresh cached value or runs the fetcher and
//! stores its result; [`Cache::re_cache`] drops the key first. Backend errors
//! are logged and never surface to the caller.

pub mod keys;
mod memory;
mod redis_backend;

pub use self::memory::MemoryCache;
pub use self::redis_backend::RedisCache;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache operation timed out")]
    Timeout,
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key/value backend holding serialized JSON blobs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Deletes every key starting with `prefix`, returning how many went.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
    fn backend_name(&self) -> &'static str;
}

/// TTL tier of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDuration {
    Short,
    Long,
}

#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    short_ttl: Duration,
    long_ttl: Duration,
    /// Bumped by every invalidation. A fetch that straddles an invalidation
    /// must not write its (possibly pre-mutation) result back.
    epoch: Arc<AtomicU64>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, short_ttl: Duration, long_ttl: Duration) -> Self {
        Self {
            store,
            short_ttl,
            long_ttl,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn memory(short_ttl: Duration, long_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCache::new()), short_ttl, long_ttl)
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn ttl(&self, duration: CacheDuration) -> Duration {
        match duration {
            CacheDuration::Short => self.short_ttl,
            CacheDuration::Long => self.long_ttl,
        }
    }

    /// Returns the cached value under `key`, or runs `fetcher`, stores the
    /// result for the `duration` tier and returns it. Fetcher errors are
    /// returned as-is and nothing is stored.
    pub async fn with_cache<T, E, F, Fut>(&self, key: &str, duration: CacheDuration, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.read(key).await {
            return Ok(value);
        }
        self.fetch_and_store(key, duration, fetcher).await
    }

    /// Drops `key` and refetches, so the caller always observes current
    /// state.
    pub async fn re_cache<T, E, F, Fut>(&self, key: &str, duration: CacheDuration, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.invalidate(key).await;
        self.fetch_and_store(key, duration, fetcher).await
    }

    pub async fn invalidate(&self, key: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.delete(key).await {
            log::error!(target: "adminhub::cache", "invalidate {key} failed: {e}");
        } else {
            log::debug!(target: "adminhub::cache", "invalidated {key}");
        }
    }

    pub async fn invalidate_prefix(&self, prefix: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        match self.store.delete_prefix(prefix).await {
            Ok(removed) => log::debug!(target: "adminhub::cache", "invalidated {removed} keys under {prefix}"),
            Err(e) => log::error!(target: "adminhub::cache", "invalidate prefix {prefix} failed: {e}"),
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::trace!(target: "adminhub::cache", "miss {key}");
                return None;
            }
            Err(e) => {
                log::warn!(target: "adminhub::cache", "read {key} failed, fetching directly: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                log::trace!(target: "adminhub::cache", "hit {key}");
                Some(value)
            }
            Err(e) => {
                log::warn!(target: "adminhub::cache", "discarding undecodable entry {key}: {e}");
                if let Err(e) = self.store.delete(key).await {
                    log::warn!(target: "adminhub::cache", "delete {key} failed: {e}");
                }
                None
            }
        }
    }

    async fn fetch_and_store<T, E, F, Fut>(&self, key: &str, duration: CacheDuration, fetcher: F) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started_at = self.epoch.load(Ordering::SeqCst);
        let value = fetcher().await?;

        if self.epoch.load(Ordering::SeqCst) != started_at {
            log::debug!(target: "adminhub::cache", "skipping write of {key}: invalidated during fetch");
            return Ok(value);
        }

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.store.set(key, raw, self.ttl(duration)).await {
                    log::warn!(target: "adminhub::cache", "write {key} failed: {e}");
                }
            }
            Err(e) => log::error!(target: "adminhub::cache", "serialize {key} failed: {e}"),
        }

        // An invalidation may have landed while the write was in flight; its
        // delete then ran before our set, so undo the set.
        if self.epoch.load(Ordering::SeqCst) != started_at {
            log::debug!(target: "adminhub::cache", "dropping write of {key}: invalidated during write");
            if let Err(e) = self.store.delete(key).await {
                log::error!(target: "adminhub::cache", "delete {key} failed: {e}");
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Backend that fails every call, like an unreachable Redis.
    struct UnreachableCache;

    #[async_trait]
    impl CacheStore for UnreachableCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Timeout)
        }
        async fn delete_prefix(&self, _prefix: &str) -> Result<u64, CacheError> {
            Err(CacheError::Timeout)
        }
        fn backend_name(&self) -> &'static str {
            "unreachable"
        }
    }

    fn cache() -> Cache {
        Cache::memory(Duration::from_secs(60), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let value: Result<Vec<String>, ()> = cache
                .with_cache("k", CacheDuration::Long, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["a".to_string()])
                })
                .await;
            assert_eq!(value.unwrap(), vec!["a".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_backend_falls_back_to_fetcher() {
        let cache = Cache::new(Arc::new(UnreachableCache), Duration::from_secs(1), Duration::from_secs(1));
        let value: Result<u32, ()> = cache.with_cache("k", CacheDuration::Short, || async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
        let value: Result<u32, ()> = cache.re_cache("k", CacheDuration::Short, || async { Ok(8) }).await;
        assert_eq!(value, Ok(8));
        cache.invalidate_prefix("k").await;
    }

    #[tokio::test]
    async fn fetcher_error_is_returned_and_not_cached() {
        let cache = cache();
        let err: Result<u32, &str> = cache.with_cache("k", CacheDuration::Short, || async { Err("boom") }).await;
        assert_eq!(err, Err("boom"));
        let ok: Result<u32, &str> = cache.with_cache("k", CacheDuration::Short, || async { Ok(1) }).await;
        assert_eq!(ok, Ok(1));
    }

    #[tokio::test]
    async fn re_cache_replaces_stale_value_and_is_idempotent() {
        let cache = cache();
        let _: Result<u32, ()> = cache.with_cache("k", CacheDuration::Long, || async { Ok(1) }).await;

        let first: Result<u32, ()> = cache.re_cache("k", CacheDuration::Long, || async { Ok(2) }).await;
        let second: Result<u32, ()> = cache.re_cache("k", CacheDuration::Long, || async { Ok(2) }).await;
        assert_eq!(first, Ok(2));
        assert_eq!(second, Ok(2));

        let cached: Result<u32, ()> = cache.with_cache("k", CacheDuration::Long, || async { Ok(99) }).await;
        assert_eq!(cached, Ok(2));
    }

    #[tokio::test]
    async fn fetch_straddling_an_invalidation_is_not_stored() {
        let cache = cache();
        let inner = cache.clone();
        let stale: Result<String, ()> = cache
            .with_cache("k", CacheDuration::Long, || async move {
                // A concurrent mutation lands while this fetch is in flight.
                inner.invalidate("k").await;
                Ok("pre-mutation".to_string())
            })
            .await;
        assert_eq!(stale.unwrap(), "pre-mutation");

        let fresh: Result<String, ()> = cache
            .with_cache("k", CacheDuration::Long, || async { Ok("post-mutation".to_string()) })
            .await;
        assert_eq!(fresh.unwrap(), "post-mutation");
    }

    /// Memory backend whose first `set` parks until released.
    struct SlowSet {
        inner: MemoryCache,
        armed: std::sync::atomic::AtomicBool,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl CacheStore for SlowSet {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.set(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }
        async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
            self.inner.delete_prefix(prefix).await
        }
        fn backend_name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn invalidation_during_the_write_is_not_overwritten() {
        let backend = Arc::new(SlowSet {
            inner: MemoryCache::new(),
            armed: std::sync::atomic::AtomicBool::new(true),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let cache = Cache::new(backend.clone(), Duration::from_secs(60), Duration::from_secs(3600));

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .with_cache("permission-set:u", CacheDuration::Long, || async {
                        Ok::<_, ()>(vec!["pre".to_string()])
                    })
                    .await
            })
        };
        backend.entered.notified().await;
        cache.invalidate("permission-set:u").await;
        backend.release.notify_one();
        assert_eq!(writer.await.unwrap(), Ok(vec!["pre".to_string()]));

        let fresh: Result<Vec<String>, ()> = cache
            .with_cache("permission-set:u", CacheDuration::Long, || async { Ok(vec!["post".to_string()]) })
            .await;
        assert_eq!(fresh, Ok(vec!["post".to_string()]));
    }

    #[tokio::test]
    async fn undecodable_entry_is_refetched() {
        let store = Arc::new(MemoryCache::new());
        store.set("k", "not json".into(), Duration::from_secs(60)).await.unwrap();
        let cache = Cache::new(store, Duration::from_secs(60), Duration::from_secs(60));
        let value: Result<u32, ()> = cache.with_cache("k", CacheDuration::Short, || async { Ok(5) }).await;
        assert_eq!(value, Ok(5));
    }
}
