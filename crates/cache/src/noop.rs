//! No-op cache backend — disables token count caching entirely.

use async_trait::async_trait;
use ctxpack_core::cache::{CacheBackend, CacheKey, CacheScope};
use ctxpack_core::error::CacheError;
use std::time::Duration;

/// A cache that stores nothing; every read is a miss.
pub struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
    fn name(&self) -> &str {
        "none"
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(
        &self,
        _key: &CacheKey,
        _value: String,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate_all(&self, _scope: CacheScope, _id: &str) -> Result<usize, CacheError> {
        Ok(0)
    }
}
