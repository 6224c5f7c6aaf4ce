//! # postcache
//!
//! A cache-aside layer for edge-hosted HTTP handlers that caches `POST`
//! responses keyed on the request body, not just the URL.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use postcache::cache::{CacheConfig, MemoryStore, PostCacheMiddleware};
//! use postcache::middleware::LoggerMiddleware;
//! use postcache::origin::OriginError;
//! use postcache::service::Service;
//! use postcache::{Request, Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Service::builder(|_req: Request| async {
//!         Ok::<_, OriginError>(Response::new(StatusCode::OK).body("from origin"))
//!     })
//!     .layer(LoggerMiddleware)
//!     .layer(PostCacheMiddleware::new(MemoryStore::new(), &CacheConfig::default()))
//!     .build();
//!
//!     let request = Request::post("https://example.com/search")?.with_body(r#"{"q":"rust"}"#);
//!     let response = service.handle(request).await;
//!     println!("{}", response.status());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod origin;
pub mod service;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use background::BackgroundTasks;
pub use cache::{CacheAside, CacheConfig, CacheKey, CacheStore, KeyDeriver, MemoryStore};
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use origin::{Origin, OriginError};
pub use service::Service;
