//! Static registry — an explicit identifier → tokenizer map.

use ctxpack_core::error::TokenizerError;
use ctxpack_core::tokenizer::{Tokenizer, TokenizerRegistry};
use std::collections::HashMap;
use std::sync::Arc;

/// A registry populated up front; unknown identifiers are unavailable.
#[derive(Default)]
pub struct StaticTokenizerRegistry {
    tokenizers: HashMap<String, Arc<dyn Tokenizer>>,
}

impl StaticTokenizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tokenizer` under `model_identifier`, replacing any previous one.
    pub fn register(&mut self, model_identifier: impl Into<String>, tokenizer: Arc<dyn Tokenizer>) {
        self.tokenizers.insert(model_identifier.into(), tokenizer);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, model_identifier: impl Into<String>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.register(model_identifier, tokenizer);
        self
    }

    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tokenizers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl TokenizerRegistry for StaticTokenizerRegistry {
    fn resolve(&self, model_identifier: &str) -> Result<Arc<dyn Tokenizer>, TokenizerError> {
        self.tokenizers
            .get(model_identifier)
            .cloned()
            .ok_or_else(|| TokenizerError::Unavailable {
                model: model_identifier.to_string(),
                reason: format!("not registered (known: {})", self.models().join(", ")),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatTemplate, WhitespaceTokenizer};

    #[test]
    fn resolves_registered_models_only() {
        let registry = StaticTokenizerRegistry::new()
            .with("plain", Arc::new(WhitespaceTokenizer::new("plain")))
            .with(
                "gemma",
                Arc::new(WhitespaceTokenizer::with_template("gemma", ChatTemplate::Gemma)),
            );

        assert_eq!(registry.resolve("plain").unwrap().name(), "plain");
        assert!(registry.resolve("gemma").unwrap().has_chat_template());

        let Err(err) = registry.resolve("missing") else {
            panic!("unregistered model resolved");
        };
        assert!(matches!(err, TokenizerError::Unavailable { .. }));
        assert!(err.to_string().contains("gemma, plain"));
    }
}
