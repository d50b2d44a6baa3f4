//! Standalone token counting for stored content.
//!
//! Message details are counted template-free (raw content only) and never
//! cached, since their cache scope would collide with the packer's templated
//! per-message counts. Conversation totals are templated and cached under the
//! conversation scope with a bounded lifetime.

use crate::cache::TokenCountCache;
use crate::fallback::TemplateEngine;
use ctxpack_core::cache::CacheKey;
use ctxpack_core::error::Result;
use ctxpack_core::message::{ChatMessage, ConversationId};
use ctxpack_core::render::{ConversationTokenCount, MessageTokenCount};
use ctxpack_core::tokenizer::TokenizerRegistry;
use std::slice;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default lifetime of a cached conversation total.
pub const DEFAULT_CONVERSATION_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct TokenCounter {
    registry: Arc<dyn TokenizerRegistry>,
    cache: TokenCountCache,
    conversation_ttl: Duration,
}

impl TokenCounter {
    pub fn new(registry: Arc<dyn TokenizerRegistry>, cache: TokenCountCache) -> Self {
        Self {
            registry,
            cache,
            conversation_ttl: DEFAULT_CONVERSATION_TTL,
        }
    }

    pub fn with_conversation_ttl(mut self, ttl: Duration) -> Self {
        self.conversation_ttl = ttl;
        self
    }

    /// Count `messages` for `model`, with or without the chat template.
    pub fn count(&self, messages: &[ChatMessage], model: &str, apply_template: bool) -> Result<usize> {
        let tokenizer = self.registry.resolve(model)?;
        let count = TemplateEngine::new(tokenizer.as_ref()).tokenize(messages, apply_template)?;
        Ok(count)
    }

    /// Raw content cost of a stored message and of its rejected alternative.
    pub fn count_message(
        &self,
        message: &ChatMessage,
        rejected: Option<&str>,
        model: &str,
    ) -> Result<MessageTokenCount> {
        let tokenizer = self.registry.resolve(model)?;
        let engine = TemplateEngine::new(tokenizer.as_ref());

        let token_count = engine.tokenize(slice::from_ref(message), false)?;
        let rejected_token_count = match rejected {
            Some(text) => {
                let alternative = ChatMessage::new(message.role, text);
                engine.tokenize(slice::from_ref(&alternative), false)?
            }
            None => 0,
        };
        Ok(MessageTokenCount {
            token_count,
            rejected_token_count,
        })
    }

    /// Templated cost of a whole conversation, cached per model.
    pub async fn count_conversation(
        &self,
        conversation_id: &ConversationId,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<ConversationTokenCount> {
        if messages.is_empty() {
            return Ok(ConversationTokenCount::default());
        }

        let key = CacheKey::conversation(conversation_id.0.clone(), model);
        if let Some(cached) = self.cache.get_json::<ConversationTokenCount>(&key).await {
            return Ok(cached);
        }

        let result = ConversationTokenCount {
            token_count: self.count(messages, model, true)?,
            message_count: messages.len(),
        };
        debug!(
            conversation = %conversation_id,
            model,
            tokens = result.token_count,
            "Conversation counted"
        );
        self.cache
            .set_json(&key, &result, Some(self.conversation_ttl))
            .await;
        Ok(result)
    }
}
