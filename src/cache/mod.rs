//! Body-keyed caching for POST requests.
//!
//! - [`KeyDeriver`] decides cacheability and builds a [`CacheKey`] from the
//!   method, URL, and a digest of the body.
//! - [`CacheAside`] runs lookup → origin → background store around it.
//! - [`CacheStore`] is the store capability; [`MemoryStore`] is the
//!   in-process implementation.
//! - [`PostCacheMiddleware`] plugs the orchestrator into a middleware
//!   pipeline.

pub mod aside;
pub mod config;
pub mod key;
pub mod memory;
pub mod middleware;
pub mod store;

pub use aside::{CacheAside, is_storable};
pub use config::{CacheConfig, QueryMode};
pub use key::{CacheKey, KeyDeriver};
pub use memory::MemoryStore;
pub use middleware::PostCacheMiddleware;
pub use store::{CacheStore, StoreError, StoreFuture};
