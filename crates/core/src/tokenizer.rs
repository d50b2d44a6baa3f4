//! Tokenizer trait — the abstraction over model-specific tokenizers.
//!
//! A Tokenizer knows how to turn a role/content sequence into the exact text
//! a model expects (its chat template) and how many tokens a piece of text
//! costs. A TokenizerRegistry resolves a model identifier to a Tokenizer.
//!
//! Implementations: whitespace (deterministic, for tests and offline use),
//! static registry, Hugging Face `tokenizer.json` (feature `hf`).

use crate::error::TokenizerError;
use crate::message::ChatMessage;
use std::sync::Arc;

/// A model-specific tokenizer.
///
/// Rendering must be deterministic: identical input yields identical text.
/// Calls are CPU-bound and may be slow; callers must not assume
/// sub-millisecond latency.
pub trait Tokenizer: Send + Sync {
    /// The model identifier this tokenizer was resolved from.
    fn name(&self) -> &str;

    /// Source of the tokenizer's own chat template, if it ships one.
    fn chat_template(&self) -> Option<&str>;

    /// End-of-sequence marker of the tokenizer.
    fn eos_token(&self) -> Option<&str>;

    /// Render messages through the tokenizer's chat template.
    ///
    /// Fails with [`TokenizerError::NoChatTemplate`] when there is no
    /// template and [`TokenizerError::TemplateRejected`] when the template
    /// refuses the role sequence.
    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String, TokenizerError>;

    /// Count the tokens of `text` without adding special tokens.
    fn encode(&self, text: &str) -> Result<usize, TokenizerError>;

    fn has_chat_template(&self) -> bool {
        self.chat_template().is_some()
    }
}

/// Resolve-by-identifier access to tokenizers.
pub trait TokenizerRegistry: Send + Sync {
    /// Resolve `model_identifier` to a tokenizer.
    ///
    /// Fails with [`TokenizerError::Unavailable`] when the identifier cannot be
    /// resolved; this is surfaced as a client error and never retried.
    fn resolve(&self, model_identifier: &str) -> Result<Arc<dyn Tokenizer>, TokenizerError>;
}
