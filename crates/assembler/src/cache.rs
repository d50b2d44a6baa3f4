//! Soft-failure wrapper around a [`CacheBackend`].
//!
//! The cache is an optimisation, never a correctness dependency: a failed read
//! is a miss and a failed write is logged and skipped. Invalidation is the one
//! operation whose failure is returned, since the mutating caller must know
//! the eviction did not happen.

use ctxpack_core::cache::{CacheBackend, CacheKey, CacheScope};
use ctxpack_core::error::CacheError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Typed token-count access over a shared cache backend.
#[derive(Clone)]
pub struct TokenCountCache {
    backend: Arc<dyn CacheBackend>,
}

impl TokenCountCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Read an exact integer count; errors and unparsable values are misses.
    pub async fn get_count(&self, key: &CacheKey) -> Option<usize> {
        let raw = self.get_raw(key).await?;
        match raw.parse::<usize>() {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring non-integer cache entry");
                None
            }
        }
    }

    pub async fn set_count(&self, key: &CacheKey, count: usize, ttl: Option<Duration>) {
        self.set_raw(key, count.to_string(), ttl).await;
    }

    /// Read a small JSON result object; errors and bad JSON are misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring malformed cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, raw, ttl).await,
            Err(e) => warn!(key = %key, error = %e, "Failed to serialize cache entry"),
        }
    }

    /// Evict every model's entry for `(scope, id)`.
    pub async fn invalidate_all(&self, scope: CacheScope, id: &str) -> Result<usize, CacheError> {
        self.backend.invalidate_all(scope, id).await
    }

    async fn get_raw(&self, key: &CacheKey) -> Option<String> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => {
                debug!(key = %key, "Cache hit");
                Some(raw)
            }
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn set_raw(&self, key: &CacheKey, raw: String, ttl: Option<Duration>) {
        if let Err(e) = self.backend.set(key, raw, ttl).await {
            warn!(key = %key, error = %e, "Cache write failed, continuing");
        }
    }
}
