//! In-memory backend — process-local cache with TTL and prefix sweeps.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use ctxpack_core::cache::{CacheBackend, CacheKey, CacheScope};
use ctxpack_core::error::CacheError;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

struct Entry {
    value: String,
    /// `None` = lives until invalidated
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A cache backed by a `HashMap` of string keys.
///
/// Keys use the `"<scope>:<id>:<model>"` layout, so an invalidation sweep is a
/// prefix match on `"<scope>:<id>:"`. Expired entries read as misses and are
/// dropped lazily on read; every `purge_interval` writes also sweep out the
/// expired entries nobody reads again.
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    default_ttl: Option<Duration>,
    purge_interval: usize,
    writes: Arc<AtomicUsize>,
}

/// Writes between two opportunistic purges.
pub const DEFAULT_PURGE_INTERVAL: usize = 256;

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl: None,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Purge expired entries every `interval` writes (`0` disables).
    pub fn with_purge_interval(mut self, interval: usize) -> Self {
        self.purge_interval = interval;
        self
    }

    /// TTL applied when `set` is called without one.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Expiry instant for `ttl`; `None` when the TTL is too large to represent.
fn expiry(ttl: Duration) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::from_std(ttl).ok()?;
    Utc::now().checked_add_signed(delta)
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let key = key.to_string();
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(&key);
            debug!(key = %key, "Expired cache entry dropped");
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &CacheKey,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = ttl.or(self.default_ttl).and_then(expiry);
        let mut entries = self.entries.write().await;
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if self.purge_interval > 0 && writes % self.purge_interval == 0 {
            let now = Utc::now();
            let before = entries.len();
            entries.retain(|_, e| !e.is_expired(now));
            debug!(purged = before - entries.len(), "Expired cache entries purged");
        }
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn invalidate_all(&self, scope: CacheScope, id: &str) -> Result<usize, CacheError> {
        let pattern = CacheKey::sweep_pattern(scope, id);
        let prefix = pattern.trim_end_matches('*');

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        debug!(pattern = %pattern, removed, "Cache sweep");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get() {
        let cache = InMemoryCache::new();
        let key = CacheKey::message("1", "gpt2");
        assert_eq!(cache.get(&key).await.unwrap(), None);

        cache.set(&key, "42".into(), None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let cache = InMemoryCache::new();
        let key = CacheKey::message("1", "gpt2");
        cache.set(&key, "1".into(), None).await.unwrap();
        cache.set(&key, "2".into(), None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("2"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let cache = InMemoryCache::new();
        let key = CacheKey::conversation("9", "gpt2");
        cache.set(&key, "{}".into(), Some(Duration::ZERO)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn default_ttl_applies_when_unset() {
        let cache = InMemoryCache::new().with_default_ttl(Some(Duration::ZERO));
        let key = CacheKey::message("1", "gpt2");
        cache.set(&key, "5".into(), None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);

        // An explicit TTL wins over the default.
        cache
            .set(&key, "5".into(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn huge_ttl_never_expires() {
        let cache = InMemoryCache::new();
        let key = CacheKey::message("1", "gpt2");
        cache.set(&key, "7".into(), Some(Duration::MAX)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn sweep_removes_every_model_for_id() {
        let cache = InMemoryCache::new();
        for model in ["gpt2", "Qwen/Qwen2-0.5B-Instruct", "meta-llama/Llama-3.2-1B"] {
            cache.set(&CacheKey::message("1", model), "3".into(), None).await.unwrap();
        }
        cache.set(&CacheKey::message("11", "gpt2"), "4".into(), None).await.unwrap();
        cache.set(&CacheKey::conversation("1", "gpt2"), "{}".into(), None).await.unwrap();

        let removed = cache.invalidate_all(CacheScope::Message, "1").await.unwrap();
        assert_eq!(removed, 3);

        // Neither a longer id sharing the prefix nor another scope is touched.
        assert!(cache.get(&CacheKey::message("11", "gpt2")).await.unwrap().is_some());
        assert!(cache.get(&CacheKey::conversation("1", "gpt2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let cache = InMemoryCache::new();
        cache
            .set(&CacheKey::message("1", "m"), "1".into(), Some(Duration::ZERO))
            .await
            .unwrap();
        cache.set(&CacheKey::message("2", "m"), "2".into(), None).await.unwrap();
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn writes_purge_unread_expired_entries() {
        let cache = InMemoryCache::new().with_purge_interval(3);
        for id in ["1", "2"] {
            cache
                .set(&CacheKey::conversation(id, "m"), "{}".into(), Some(Duration::ZERO))
                .await
                .unwrap();
        }
        assert_eq!(cache.len().await, 2);

        // The third write sweeps both stale totals before inserting.
        cache.set(&CacheKey::message("3", "m"), "3".into(), None).await.unwrap();
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn sweep_ignores_ids_that_extend_with_a_colon() {
        let cache = InMemoryCache::new();
        cache.set(&CacheKey::message("1", "gpt2"), "3".into(), None).await.unwrap();
        cache.set(&CacheKey::message("1:x", "gpt2"), "4".into(), None).await.unwrap();

        assert_eq!(cache.invalidate_all(CacheScope::Message, "1").await.unwrap(), 1);
        assert_eq!(
            cache.get(&CacheKey::message("1:x", "gpt2")).await.unwrap().as_deref(),
            Some("4")
        );
        assert_eq!(cache.invalidate_all(CacheScope::Message, "1:x").await.unwrap(), 1);
    }
}
