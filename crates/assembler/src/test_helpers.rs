//! Shared test helpers for assembler tests.

use async_trait::async_trait;
use ctxpack_core::cache::{CacheBackend, CacheKey, CacheScope};
use ctxpack_core::error::{CacheError, TokenizerError};
use ctxpack_core::message::ChatMessage;
use ctxpack_core::tokenizer::{Tokenizer, TokenizerRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A tokenizer whose costs are scripted per line of content.
///
/// Its template renders every message as `CONTENT\n` and nothing else, so
/// a message's cost is exactly the scripted cost of its content. Lines with
/// no scripted cost fall back to their whitespace piece count.
pub struct FixedCostTokenizer {
    costs: HashMap<String, usize>,
    encode_calls: AtomicUsize,
}

impl FixedCostTokenizer {
    pub fn new(costs: &[(&str, usize)]) -> Self {
        Self {
            costs: costs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            encode_calls: AtomicUsize::new(0),
        }
    }

    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }
}

impl Tokenizer for FixedCostTokenizer {
    fn name(&self) -> &str {
        "fixed"
    }

    fn chat_template(&self) -> Option<&str> {
        Some("{% for m in messages %}{{ m.content }}\n{% endfor %}")
    }

    fn eos_token(&self) -> Option<&str> {
        Some("</end>")
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        _add_generation_prompt: bool,
    ) -> Result<String, TokenizerError> {
        Ok(messages.iter().map(|m| format!("{}\n", m.content)).collect())
    }

    fn encode(&self, text: &str) -> Result<usize, TokenizerError> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        Ok(text
            .lines()
            .map(|line| {
                self.costs
                    .get(line)
                    .copied()
                    .unwrap_or_else(|| line.split_whitespace().count())
            })
            .sum())
    }
}

/// A tokenizer whose template rejects every sequence.
pub struct RejectingTokenizer {
    template: String,
}

impl RejectingTokenizer {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Tokenizer for RejectingTokenizer {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn chat_template(&self) -> Option<&str> {
        Some(&self.template)
    }

    fn eos_token(&self) -> Option<&str> {
        None
    }

    fn apply_chat_template(
        &self,
        _messages: &[ChatMessage],
        _add_generation_prompt: bool,
    ) -> Result<String, TokenizerError> {
        Err(TokenizerError::TemplateRejected("always".into()))
    }

    fn encode(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(text.split_whitespace().count())
    }
}

/// Registry that hands out the same tokenizer for any identifier.
pub struct SingleRegistry(pub Arc<dyn Tokenizer>);

impl TokenizerRegistry for SingleRegistry {
    fn resolve(&self, _model_identifier: &str) -> Result<Arc<dyn Tokenizer>, TokenizerError> {
        Ok(self.0.clone())
    }
}

/// A cache backend where every operation fails.
pub struct FailingCache;

#[async_trait]
impl CacheBackend for FailingCache {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn set(
        &self,
        _key: &CacheKey,
        _value: String,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn invalidate_all(&self, _scope: CacheScope, _id: &str) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}
