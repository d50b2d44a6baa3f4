//! Whitespace tokenizer — deterministic, dependency-free backend.
//!
//! Every whitespace-separated piece of text is one token. Useful for tests,
//! offline runs, and as a stand-in when no model files are available.

use crate::template::ChatTemplate;
use ctxpack_core::error::TokenizerError;
use ctxpack_core::message::ChatMessage;
use ctxpack_core::tokenizer::{Tokenizer, TokenizerRegistry};
use std::sync::Arc;

/// A tokenizer that counts whitespace-delimited pieces.
pub struct WhitespaceTokenizer {
    name: String,
    template: Option<ChatTemplate>,
}

impl WhitespaceTokenizer {
    /// A tokenizer without a chat template.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: None,
        }
    }

    /// A tokenizer that renders through `template`.
    pub fn with_template(name: impl Into<String>, template: ChatTemplate) -> Self {
        Self {
            name: name.into(),
            template: Some(template),
        }
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn chat_template(&self) -> Option<&str> {
        self.template.map(|t| t.source())
    }

    fn eos_token(&self) -> Option<&str> {
        self.template.map(|t| t.eos_token())
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String, TokenizerError> {
        let template = self.template.ok_or(TokenizerError::NoChatTemplate)?;
        template.render(messages, add_generation_prompt)
    }

    fn encode(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(text.split_whitespace().count())
    }
}

/// Resolves any non-empty model identifier to a template-less
/// [`WhitespaceTokenizer`].
#[derive(Debug, Default)]
pub struct WhitespaceRegistry;

impl TokenizerRegistry for WhitespaceRegistry {
    fn resolve(&self, model_identifier: &str) -> Result<Arc<dyn Tokenizer>, TokenizerError> {
        if model_identifier.trim().is_empty() {
            return Err(TokenizerError::Unavailable {
                model: model_identifier.to_string(),
                reason: "empty model identifier".into(),
            });
        }
        Ok(Arc::new(WhitespaceTokenizer::new(model_identifier)))
    }
}
