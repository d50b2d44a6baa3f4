//! Budget packer — assembles the final prompt for one generation call.
//!
//! Packing order:
//!
//! 1. **System message** — always included, cost subtracted up front
//! 2. **Author's note** — cost subtracted when both text and index are given
//! 3. **Generation reserve + fixed overhead** — subtracted up front
//! 4. **History** — walked newest → oldest; the first message that does not
//!    fit closes the window, and it and everything older is shifted out
//! 5. **Example dialogue** — admitted as one block if the remainder allows
//!
//! The budget is signed: when the fixed parts alone exceed the context window
//! the render still succeeds with every history message shifted.
//!
//! # Determinism
//!
//! Identical requests produce identical text. Cached counts equal fresh
//! counts as long as invalidation has been applied for every mutation.

use crate::cache::TokenCountCache;
use crate::fallback::TemplateEngine;
use ctxpack_core::cache::CacheKey;
use ctxpack_core::error::Result;
use ctxpack_core::message::ChatMessage;
use ctxpack_core::render::{PackMetadata, RenderRequest, RenderResult};
use ctxpack_core::tokenizer::TokenizerRegistry;
use std::slice;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tokens held back for template scaffolding the per-part counts miss.
pub const DEFAULT_RESERVED_OVERHEAD: usize = 50;

/// Budget arithmetic is signed; counts past `i64::MAX` saturate.
fn signed(tokens: usize) -> i64 {
    i64::try_from(tokens).unwrap_or(i64::MAX)
}

/// Packs history into a model's context window.
#[derive(Clone)]
pub struct ContextPacker {
    registry: Arc<dyn TokenizerRegistry>,
    cache: TokenCountCache,
    reserved_overhead: usize,
}

impl ContextPacker {
    pub fn new(registry: Arc<dyn TokenizerRegistry>, cache: TokenCountCache) -> Self {
        Self {
            registry,
            cache,
            reserved_overhead: DEFAULT_RESERVED_OVERHEAD,
        }
    }

    pub fn with_reserved_overhead(mut self, reserved_overhead: usize) -> Self {
        self.reserved_overhead = reserved_overhead;
        self
    }

    pub fn reserved_overhead(&self) -> usize {
        self.reserved_overhead
    }

    /// Render `request` into a single prompt string.
    ///
    /// Fails with a tokenizer error when the model cannot be resolved and a
    /// template error when even the repaired sequence cannot be rendered.
    /// Cache failures never fail a render.
    pub async fn assemble(&self, request: &RenderRequest) -> Result<RenderResult> {
        let model = request.model_identifier.as_str();
        let tokenizer = self.registry.resolve(model)?;
        let engine = TemplateEngine::new(tokenizer.as_ref());

        let fixed_reserve = request
            .max_generation_tokens
            .saturating_add(self.reserved_overhead);
        if request.max_context_tokens <= fixed_reserve {
            warn!(
                model,
                max_context_tokens = request.max_context_tokens,
                max_generation_tokens = request.max_generation_tokens,
                reserved_overhead = self.reserved_overhead,
                "Context window leaves no room for history"
            );
        }

        let system_tokens = engine.tokenize(slice::from_ref(&request.system_message), true)?;

        let note_message = request.authors_note.as_ref().map(ChatMessage::system);
        let note_tokens = match &note_message {
            Some(note) => engine.tokenize(slice::from_ref(note), true)?,
            None => 0,
        };
        let note_index = request.placed_authors_note().map(|(_, index)| index);
        let charged_note = if note_index.is_some() { note_tokens } else { 0 };

        let mut budget = signed(request.max_context_tokens)
            .saturating_sub(signed(system_tokens))
            .saturating_sub(signed(charged_note))
            .saturating_sub(signed(request.max_generation_tokens))
            .saturating_sub(signed(self.reserved_overhead));
        debug!(model, budget, system_tokens, note_tokens, "Packing history");

        // ── History, newest first ──
        let mut admitted = Vec::new();
        let mut shifted = Vec::new();
        let mut history_tokens = 0;
        let mut cache_hits = 0;
        let mut window_closed = false;

        for message in request.history.iter().rev() {
            if window_closed {
                shifted.push(message.clone());
                continue;
            }
            let (tokens, hit) = self.message_tokens(&engine, message, model).await?;
            if hit {
                cache_hits += 1;
            }
            if budget >= signed(tokens) {
                budget -= signed(tokens);
                history_tokens += tokens;
                admitted.push(message.clone());
            } else {
                debug!(model, id = ?message.id, tokens, budget, "History window closed");
                shifted.push(message.clone());
                budget = budget.min(0);
                window_closed = true;
            }
        }
        admitted.reverse();
        shifted.reverse();

        // ── Examples, all or nothing ──
        let mut example_tokens = 0;
        let mut examples_included = false;
        if !request.example_messages.is_empty() {
            let cost = engine.tokenize(&request.example_messages, true)?;
            if budget >= signed(cost) {
                budget -= signed(cost);
                example_tokens = cost;
                examples_included = true;
            } else {
                debug!(model, cost, budget, "Example dialogue does not fit");
            }
        }

        // ── Final sequence ──
        let admitted_count = admitted.len();
        let mut sequence = Vec::with_capacity(
            2 + admitted_count + request.example_messages.len(),
        );
        sequence.push(request.system_message.clone());
        if examples_included {
            sequence.extend(request.example_messages.iter().cloned());
        }
        sequence.extend(admitted);
        if let (Some(note), Some(index)) = (note_message, note_index) {
            let position = index.saturating_add(1).min(sequence.len());
            sequence.insert(position, note);
        }

        let rendered = engine.render(&sequence, true)?;
        let mut text = rendered.text;
        text.push_str(&request.postfix);

        info!(
            model,
            admitted = admitted_count,
            shifted = shifted.len(),
            cache_hits,
            remaining_budget = budget,
            "Prompt assembled"
        );

        Ok(RenderResult {
            text,
            eos_marker: rendered.eos_marker,
            shifted_messages: shifted,
            metadata: PackMetadata {
                system_tokens,
                note_tokens,
                history_tokens,
                example_tokens,
                remaining_budget: budget,
                admitted: admitted_count,
                examples_included,
                cache_hits,
                template: Some(rendered.source),
            },
        })
    }

    /// Templated cost of one history message, and whether it came from cache.
    ///
    /// Only persisted messages touch the cache; ephemeral ones are always
    /// tokenized fresh.
    async fn message_tokens(
        &self,
        engine: &TemplateEngine<'_>,
        message: &ChatMessage,
        model: &str,
    ) -> Result<(usize, bool)> {
        let Some(id) = &message.id else {
            return Ok((engine.tokenize(slice::from_ref(message), true)?, false));
        };

        let key = CacheKey::message(id.0.clone(), model);
        if let Some(count) = self.cache.get_count(&key).await {
            return Ok((count, true));
        }
        let count = engine.tokenize(slice::from_ref(message), true)?;
        self.cache.set_count(&key, count, None).await;
        Ok((count, false))
    }
}
