//! Cache-aside orchestration for body-keyed requests.
//!
//! Per request:
//!
//! 1. classify with the [`KeyDeriver`]; non-cacheable or unreadable bodies
//!    go straight to the origin,
//! 2. look the key up; a hit is returned as stored and the origin is never
//!    contacted,
//! 3. on a miss fetch from the origin,
//! 4. hand a clone of a storable response to a background put,
//! 5. return the origin response untouched.
//!
//! Store failures degrade to a miss or a skipped put. Origin failures are
//! surfaced and never cached.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{CacheConfig, CacheKey, CacheStore, KeyDeriver};
use crate::background::BackgroundTasks;
use crate::http::{BodyError, Request, Response, StatusCode};
use crate::origin::{Origin, OriginError};

/// Returns `true` if `response` may be written to the cache.
///
/// Only complete successes qualify: `2xx` other than `206`, without
/// `Cache-Control: no-store` or `private`, and without `Vary: *`.
pub fn is_storable(response: &Response) -> bool {
    let status = response.status();
    if !status.is_success() || status == StatusCode::PARTIAL_CONTENT {
        return false;
    }

    let headers = response.headers();
    if headers.directive("cache-control", "no-store").is_some()
        || headers.directive("cache-control", "private").is_some()
    {
        return false;
    }

    !headers.get_all("vary").any(|v| v.trim() == "*")
}

/// The cache-aside orchestrator.
///
/// Cloning is cheap; clones share the store.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use postcache::background::BackgroundTasks;
/// use postcache::cache::{CacheAside, CacheConfig, MemoryStore};
/// use postcache::http::{Request, Response, StatusCode};
/// use postcache::origin::OriginError;
///
/// let cache = CacheAside::new(MemoryStore::new(), &CacheConfig::default());
/// let tasks = BackgroundTasks::new();
/// let origin = |_req: Request| async {
///     Ok::<_, OriginError>(Response::new(StatusCode::OK).body("Fetched from origin"))
/// };
///
/// let request = Request::post("https://example.com/path").unwrap().with_body(r#"{"data":"test"}"#);
/// let first = cache.handle(request, &origin, &tasks).await.unwrap();
/// tasks.drain().await;
///
/// let request = Request::post("https://example.com/path").unwrap().with_body(r#"{"data":"test"}"#);
/// let second = cache.handle(request, &origin, &tasks).await.unwrap();
/// assert_eq!(first, second);
/// # }
/// ```
#[derive(Debug)]
pub struct CacheAside<S> {
    deriver: KeyDeriver,
    store: Arc<S>,
}

impl<S> Clone for CacheAside<S> {
    fn clone(&self) -> Self {
        Self {
            deriver: self.deriver.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> CacheAside<S>
where
    S: CacheStore + 'static,
{
    pub fn new(store: S, config: &CacheConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Builds an orchestrator over a store that is also held elsewhere.
    pub fn with_shared_store(store: Arc<S>, config: &CacheConfig) -> Self {
        Self {
            deriver: KeyDeriver::new(config),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    /// Derives the key for `request`, or `None` if it must bypass the cache.
    ///
    /// Body read failures are logged and treated as non-cacheable.
    pub async fn classify(&self, request: &mut Request) -> Option<CacheKey> {
        match self.deriver.derive(request).await {
            Ok(key) => key,
            Err(err @ BodyError::TooLarge { .. }) => {
                debug!(path = request.path(), error = %err, "body too large to key, bypassing cache");
                None
            }
            Err(err) => {
                warn!(path = request.path(), error = %err, "unreadable body, bypassing cache");
                None
            }
        }
    }

    /// Looks `key` up. Store failures are logged and reported as a miss.
    pub async fn lookup(&self, key: &CacheKey) -> Option<Response> {
        match self.store.lookup(key).await {
            Ok(Some(hit)) => {
                debug!(key = %key, "cache hit");
                Some(hit)
            }
            Ok(None) => {
                debug!(key = %key, "cache miss");
                None
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Registers a background put of a clone of `response` under `key`.
    ///
    /// Returns `false` without registering anything when the response is not
    /// storable. The caller keeps `response` unchanged.
    pub fn store_in_background(
        &self,
        key: CacheKey,
        response: &Response,
        tasks: &BackgroundTasks,
    ) -> bool {
        if !is_storable(response) {
            debug!(key = %key, status = %response.status(), "response not storable");
            return false;
        }

        let store = Arc::clone(&self.store);
        let copy = response.clone();
        tasks.wait_until(async move {
            let label = key.to_string();
            if let Err(err) = store.put(key, copy).await {
                warn!(key = %label, error = %err, "cache store failed");
            }
        });
        true
    }

    /// Serves `request` from the cache or from `origin`.
    ///
    /// # Errors
    ///
    /// The [`OriginError`] when the origin fails; nothing is cached then.
    pub async fn handle<O>(
        &self,
        mut request: Request,
        origin: &O,
        tasks: &BackgroundTasks,
    ) -> Result<Response, OriginError>
    where
        O: Origin + ?Sized,
    {
        let Some(key) = self.classify(&mut request).await else {
            return origin.fetch(request).await;
        };

        if let Some(hit) = self.lookup(&key).await {
            return Ok(hit);
        }

        let response = origin.fetch(request).await?;
        self.store_in_background(key, &response, tasks);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_storable() {
        assert!(is_storable(&Response::new(StatusCode::OK).body("x")));
        assert!(is_storable(&Response::new(StatusCode::CREATED)));
    }

    #[test]
    fn errors_are_not_storable() {
        assert!(!is_storable(&Response::new(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(!is_storable(&Response::new(StatusCode::BAD_GATEWAY)));
        assert!(!is_storable(&Response::new(StatusCode::NOT_FOUND)));
    }

    #[test]
    fn partial_and_private_are_not_storable() {
        assert!(!is_storable(&Response::new(StatusCode::PARTIAL_CONTENT)));
        assert!(!is_storable(
            &Response::new(StatusCode::OK).header("Cache-Control", "private, max-age=60")
        ));
        assert!(!is_storable(
            &Response::new(StatusCode::OK).header("Cache-Control", "no-store")
        ));
        assert!(!is_storable(&Response::new(StatusCode::OK).header("Vary", "*")));
    }
}
