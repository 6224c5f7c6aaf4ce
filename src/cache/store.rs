//! The cache store capability.
//!
//! The store is opaque: TTL and eviction belong to whoever implements it.
//! The orchestrator only ever matches and puts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use super::CacheKey;
use crate::http::Response;

/// Errors reported by a [`CacheStore`].
///
/// These never reach the end caller: a failed lookup is treated as a miss
/// and a failed put is dropped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache store rejected the entry: {0}")]
    Rejected(&'static str),
}

/// Boxed future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A key-value response cache with atomic per-key match and put.
pub trait CacheStore: Send + Sync {
    /// Returns the response stored under `key`, or `None` on a miss.
    fn lookup<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Response>>;

    /// Stores `response` under `key`, replacing any previous entry.
    fn put(&self, key: CacheKey, response: Response) -> StoreFuture<'_, ()>;
}

impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    fn lookup<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<Response>> {
        (**self).lookup(key)
    }

    fn put(&self, key: CacheKey, response: Response) -> StoreFuture<'_, ()> {
        (**self).put(key, response)
    }
}
