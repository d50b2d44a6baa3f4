//! Cache trait — key-value storage for token counts.
//!
//! Keys are structured as `"<scope>:<id>:<model>"` so that every entry of an
//! id can be swept with the pattern `"<scope>:<id>:*"` regardless of model.
//! The id is percent-escaped (`%` and `:`) so an id containing `:` never
//! shares a sweep prefix with a shorter one.
//! Values are plain strings: decimal integers for token counts, JSON for
//! small result objects.

use async_trait::async_trait;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What kind of entity a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    Message,
    Conversation,
}

impl CacheScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Conversation => "conversation",
        }
    }
}

impl std::fmt::Display for CacheScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-lookup key: `(scope, id, model)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: CacheScope,
    pub id: String,
    pub model: String,
}

impl CacheKey {
    pub fn new(scope: CacheScope, id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            scope,
            id: id.into(),
            model: model.into(),
        }
    }

    pub fn message(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(CacheScope::Message, id, model)
    }

    pub fn conversation(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(CacheScope::Conversation, id, model)
    }

    /// Pattern matching every model's entry for `(scope, id)`.
    pub fn sweep_pattern(scope: CacheScope, id: &str) -> String {
        format!("{}:{}:*", scope, escape_id(id))
    }
}

fn escape_id(id: &str) -> std::borrow::Cow<'_, str> {
    if !id.contains(['%', ':']) {
        return std::borrow::Cow::Borrowed(id);
    }
    let mut out = String::with_capacity(id.len() + 4);
    for c in id.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    std::borrow::Cow::Owned(out)
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.scope, escape_id(&self.id), self.model)
    }
}

/// The core CacheBackend trait.
///
/// Reads and writes are single round-trips with no transactional guarantee.
/// Implementations: in-memory (TTL + prefix sweep), none (no-op).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// The backend name (e.g., "memory", "none").
    fn name(&self) -> &str;

    /// Fetch a live entry.
    async fn get(&self, key: &CacheKey) -> std::result::Result<Option<String>, CacheError>;

    /// Store an entry. `ttl = None` applies the backend's default policy.
    async fn set(
        &self,
        key: &CacheKey,
        value: String,
        ttl: Option<Duration>,
    ) -> std::result::Result<(), CacheError>;

    /// Delete every entry for `(scope, id)` across all models.
    /// Returns how many entries were removed.
    async fn invalidate_all(
        &self,
        scope: CacheScope,
        id: &str,
    ) -> std::result::Result<usize, CacheError>;
}
