//! In-process [`CacheStore`] for hosts without a platform cache, and for tests.
//!
//! Entries live in a bounded LRU. Entry lifetime follows the response's
//! `Cache-Control`: `s-maxage` wins over `max-age`, and responses without
//! either fall back to the store's default TTL (no expiry unless one is
//! configured). A lifetime of zero means the entry is not kept.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheKey, CacheStore, StoreFuture};
use crate::http::Response;

/// Entry count used by [`MemoryStore::new`].
pub const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(4096) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

#[derive(Debug)]
struct Entry {
    response: Response,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// A shared, size-bounded in-memory response cache.
///
/// Clones share the same entries. Once `capacity` entries are held, storing
/// a new key evicts the least recently used one.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<LruCache<CacheKey, Entry>>>,
    default_ttl: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryStore {
    /// Creates a store holding at most [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding at most `capacity` entries.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            default_ttl: None,
        }
    }

    /// Lifetime for responses that carry no `max-age` / `s-maxage`.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Maximum number of entries.
    pub async fn capacity(&self) -> NonZeroUsize {
        self.entries.lock().await.cap()
    }

    /// Number of stored entries, expired ones included until they are next
    /// looked up or evicted.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Returns `true` if a live entry exists for `key`. Does not touch recency.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    fn lifetime(&self, response: &Response) -> Option<Duration> {
        let headers = response.headers();
        let seconds = |directive: &str| {
            headers
                .directive("cache-control", directive)
                .flatten()
                .and_then(|v| v.parse::<u64>().ok())
        };
        seconds("s-maxage")
            .or_else(|| seconds("max-age"))
            .map(Duration::from_secs)
            .or(self.default_ttl)
    }
}

impl CacheStore for MemoryStore {
    fn lookup<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Response>> {
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.lock().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.response.clone())),
                Some(_) => {}
            }

            entries.pop(key);
            debug!(key = %key, "evicted expired entry");
            Ok(None)
        })
    }

    fn put(&self, key: CacheKey, response: Response) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let lifetime = self.lifetime(&response);
            if lifetime == Some(Duration::ZERO) {
                debug!(key = %key, "zero lifetime, not stored");
                return Ok(());
            }

            let expires_at = lifetime.map(|ttl| Instant::now() + ttl);
            debug!(key = %key, ttl = ?lifetime, "stored entry");
            let entry = Entry {
                response,
                expires_at,
            };
            if let Some((evicted, _)) = self.entries.lock().await.push(key.clone(), entry) {
                if evicted != key {
                    debug!(key = %evicted, "evicted least recently used entry");
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, KeyDeriver};
    use crate::http::{Method, StatusCode};
    use url::Url;

    fn key(body: &[u8]) -> CacheKey {
        KeyDeriver::new(&CacheConfig::default()).key_for(
            &Method::Post,
            &Url::parse("https://example.com/path").unwrap(),
            body,
        )
    }

    #[tokio::test]
    async fn put_then_lookup() {
        let store = MemoryStore::new();
        let response = Response::new(StatusCode::OK).body("cached");
        store.put(key(b"a"), response.clone()).await.unwrap();

        assert_eq!(store.lookup(&key(b"a")).await.unwrap(), Some(response));
        assert_eq!(store.lookup(&key(b"b")).await.unwrap(), None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn put_replaces_previous_entry() {
        let store = MemoryStore::new();
        store
            .put(key(b"a"), Response::new(StatusCode::OK).body("first"))
            .await
            .unwrap();
        store
            .put(key(b"a"), Response::new(StatusCode::OK).body("second"))
            .await
            .unwrap();
        let hit = store.lookup(&key(b"a")).await.unwrap().unwrap();
        assert_eq!(hit.body_str_lossy(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn max_age_expires_entries() {
        let store = MemoryStore::new();
        let response = Response::new(StatusCode::OK)
            .header("Cache-Control", "public, max-age=60")
            .body("short lived");
        store.put(key(b"a"), response).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.contains(&key(b"a")).await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.lookup(&key(b"a")).await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn s_maxage_wins_over_max_age() {
        let store = MemoryStore::new();
        let response = Response::new(StatusCode::OK)
            .header("Cache-Control", "max-age=10, s-maxage=100");
        store.put(key(b"a"), response).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.contains(&key(b"a")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn default_ttl_applies_without_directives() {
        let store = MemoryStore::new().with_default_ttl(Duration::from_secs(5));
        store
            .put(key(b"a"), Response::new(StatusCode::OK))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!store.contains(&key(b"a")).await);
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted_at_capacity() {
        let store = MemoryStore::with_capacity(NonZeroUsize::new(2).unwrap());
        for body in [b"a", b"b"] {
            store
                .put(key(body), Response::new(StatusCode::OK))
                .await
                .unwrap();
        }
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(store.lookup(&key(b"a")).await.unwrap().is_some());

        store
            .put(key(b"c"), Response::new(StatusCode::OK))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.contains(&key(b"a")).await);
        assert!(!store.contains(&key(b"b")).await);
        assert!(store.contains(&key(b"c")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_never_exceed_capacity() {
        let store = MemoryStore::with_capacity(NonZeroUsize::new(64).unwrap())
            .with_default_ttl(Duration::from_secs(1));
        for i in 0..1_000u32 {
            store
                .put(key(&i.to_be_bytes()), Response::new(StatusCode::OK))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 64);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(store.lookup(&key(b"unrelated")).await.unwrap(), None);
        assert!(store.len().await <= 64);
    }

    #[tokio::test]
    async fn zero_max_age_is_not_stored() {
        let store = MemoryStore::new();
        let response = Response::new(StatusCode::OK).header("Cache-Control", "max-age=0");
        store.put(key(b"a"), response).await.unwrap();
        assert!(store.is_empty().await);
    }
}
