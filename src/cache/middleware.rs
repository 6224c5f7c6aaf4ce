//! The cache-aside orchestrator as a pipeline layer.

use std::future::Future;
use std::pin::Pin;

use super::{CacheAside, CacheConfig, CacheStore};
use crate::{
    Response,
    context::Context,
    middleware::{Middleware, Next},
};

/// Middleware that serves cacheable POST requests from a [`CacheStore`].
///
/// Everything downstream of this layer, ending at the origin, plays the
/// origin's role: it runs only on a miss or a bypass, and its response is
/// stored in the background through the request's
/// [`BackgroundTasks`](crate::background::BackgroundTasks).
///
/// # Examples
///
/// ```rust,no_run
/// use postcache::cache::{CacheConfig, MemoryStore, PostCacheMiddleware};
///
/// let cache = PostCacheMiddleware::new(MemoryStore::new(), &CacheConfig::default());
/// ```
pub struct PostCacheMiddleware<S> {
    cache: CacheAside<S>,
}

impl<S> PostCacheMiddleware<S>
where
    S: CacheStore + 'static,
{
    pub fn new(store: S, config: &CacheConfig) -> Self {
        Self::from_cache(CacheAside::new(store, config))
    }

    /// Wraps an existing orchestrator, sharing its store.
    pub fn from_cache(cache: CacheAside<S>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CacheAside<S> {
        &self.cache
    }
}

impl<S> Middleware for PostCacheMiddleware<S>
where
    S: CacheStore + 'static,
{
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = self.cache.clone();

        Box::pin(async move {
            let Some(key) = cache.classify(ctx.request_mut()).await else {
                return next.run(ctx).await;
            };

            if let Some(hit) = cache.lookup(&key).await {
                return hit;
            }

            let tasks = ctx.tasks().clone();
            let response = next.run(ctx).await;
            cache.store_in_background(key, &response, &tasks);
            response
        })
    }
}
