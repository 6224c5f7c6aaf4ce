//! Cache layer configuration.
//!
//! Hosts usually embed this in their own settings document, so it
//! deserializes with serde and every field has a default:
//!
//! ```
//! use postcache::cache::{CacheConfig, QueryMode};
//!
//! let config = CacheConfig::from_json(r#"{ "query_mode": "exclude" }"#).unwrap();
//! assert_eq!(config.query_mode, QueryMode::Exclude);
//! assert_eq!(config.max_body_bytes, CacheConfig::DEFAULT_MAX_BODY_BYTES);
//! ```

use serde::Deserialize;

/// Whether the query string participates in the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// `?a=1` and `?a=2` are different entries.
    #[default]
    Include,
    /// The query string is ignored when keying.
    Exclude,
}

/// Settings for [`KeyDeriver`](super::KeyDeriver) and the orchestrator built on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub query_mode: QueryMode,
    /// Largest body that will be buffered for keying. Bigger requests skip the cache.
    pub max_body_bytes: usize,
}

impl CacheConfig {
    /// Matches the largest request the host buffers (8 MiB).
    pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] for malformed JSON, unknown fields,
    /// or values of the wrong type.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn query_mode(mut self, mode: QueryMode) -> Self {
        self.query_mode = mode;
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query_mode: QueryMode::default(),
            max_body_bytes: Self::DEFAULT_MAX_BODY_BYTES,
        }
    }
}
