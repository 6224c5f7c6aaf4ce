//! Cache key derivation for requests whose identity lives in their body.
//!
//! Edge caches key on the URL alone, which is useless for POST endpoints
//! such as GraphQL or search where every call shares one URL. The key
//! built here folds a SHA-256 digest of the body into a URL-shaped
//! identifier:
//!
//! ```text
//! {scheme}://{host[:port]}/{method}{path}/{sha256(body) as hex}[?{query}]
//! ```
//!
//! The digest always occupies the last path segment and is fixed-width, so
//! distinct (path, body) pairs cannot produce the same key.

use std::fmt;

use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use super::config::{CacheConfig, QueryMode};
use crate::http::{BodyError, Method, Request};

/// A cache-store identifier derived from a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decides cacheability and builds keys.
///
/// Lookups and stores for one request must go through the same deriver so
/// both sides agree on key identity.
///
/// # Examples
///
/// ```
/// use postcache::cache::{CacheConfig, KeyDeriver};
/// use postcache::http::Method;
/// use url::Url;
///
/// let deriver = KeyDeriver::new(&CacheConfig::default());
/// let url = Url::parse("https://example.com/path").unwrap();
///
/// let a = deriver.key_for(&Method::Post, &url, br#"{"data":"test1"}"#);
/// let b = deriver.key_for(&Method::Post, &url, br#"{"data":"test2"}"#);
/// assert_ne!(a, b);
/// assert!(a.as_str().starts_with("https://example.com/post/path/"));
/// ```
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    query_mode: QueryMode,
    max_body_bytes: usize,
}

impl KeyDeriver {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            query_mode: config.query_mode,
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Only `POST` requests are keyed on their body.
    pub fn is_cacheable(method: &Method) -> bool {
        *method == Method::Post
    }

    /// Builds the key for an already-buffered body.
    pub fn key_for(&self, method: &Method, url: &Url, body: &[u8]) -> CacheKey {
        let digest = Sha256::digest(body);

        let mut key = String::with_capacity(url.as_str().len() + 80);
        key.push_str(url.scheme());
        key.push_str("://");
        key.push_str(url.host_str().unwrap_or_default());
        if let Some(port) = url.port() {
            key.push(':');
            key.push_str(&port.to_string());
        }
        key.push('/');
        key.push_str(&method.as_str().to_ascii_lowercase());
        key.push_str(url.path());
        key.push('/');
        key.push_str(&format!("{digest:x}"));

        let query = url.query().filter(|_| self.query_mode == QueryMode::Include);
        if let Some(query) = query {
            key.push('?');
            key.push_str(query);
        }

        CacheKey(key)
    }

    /// Classifies `request` and, when it is cacheable, derives its key.
    ///
    /// Returns `Ok(None)` for methods that bypass the cache; their body is
    /// not touched. For cacheable requests the body is buffered in place, so
    /// the same request can still be forwarded to the origin afterwards.
    ///
    /// # Errors
    ///
    /// Any [`BodyError`] raised while buffering. A body over the limit is
    /// left forwardable; a consumed or failed stream is not.
    pub async fn derive(&self, request: &mut Request) -> Result<Option<CacheKey>, BodyError> {
        if !Self::is_cacheable(request.method()) {
            return Ok(None);
        }

        let body = request.buffer_body(self.max_body_bytes).await?;
        let key = self.key_for(request.method(), request.url(), &body);
        debug!(key = %key, body_len = body.len(), "derived cache key");
        Ok(Some(key))
    }
}
