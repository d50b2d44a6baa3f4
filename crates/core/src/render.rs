//! Render request/result value objects.
//!
//! A [`RenderRequest`] is built per call by the CRUD layer and discarded
//! afterwards; the [`RenderResult`] carries the prompt text plus the history
//! messages that did not fit.

use crate::message::ChatMessage;
use serde::{Deserialize, Serialize};

/// Everything the packer needs for one render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Fixed system prompt, always included
    pub system_message: ChatMessage,

    /// Conversation history, oldest → newest
    #[serde(default)]
    pub history: Vec<ChatMessage>,

    /// Persona/character example dialogue, admitted all-or-nothing
    #[serde(default)]
    pub example_messages: Vec<ChatMessage>,

    /// Out-of-band instruction inserted into the final sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors_note: Option<String>,

    /// Position of the author's note, counted after the system message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors_note_index: Option<usize>,

    /// Tokenizer to resolve (Hub repo id, local path, or registry key)
    pub model_identifier: String,

    /// Size of the model's context window
    pub max_context_tokens: usize,

    /// Tokens reserved for the model's reply
    pub max_generation_tokens: usize,

    /// Appended verbatim after the rendered prompt
    #[serde(default)]
    pub postfix: String,
}

impl RenderRequest {
    pub fn new(
        system_message: ChatMessage,
        history: Vec<ChatMessage>,
        model_identifier: impl Into<String>,
        max_context_tokens: usize,
        max_generation_tokens: usize,
    ) -> Self {
        Self {
            system_message,
            history,
            example_messages: Vec::new(),
            authors_note: None,
            authors_note_index: None,
            model_identifier: model_identifier.into(),
            max_context_tokens,
            max_generation_tokens,
            postfix: String::new(),
        }
    }

    pub fn with_examples(mut self, examples: Vec<ChatMessage>) -> Self {
        self.example_messages = examples;
        self
    }

    pub fn with_authors_note(mut self, note: impl Into<String>, index: usize) -> Self {
        self.authors_note = Some(note.into());
        self.authors_note_index = Some(index);
        self
    }

    pub fn with_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = postfix.into();
        self
    }

    /// The author's note text and position, only when both are given.
    pub fn placed_authors_note(&self) -> Option<(&str, usize)> {
        match (&self.authors_note, self.authors_note_index) {
            (Some(note), Some(index)) => Some((note.as_str(), index)),
            _ => None,
        }
    }
}

/// Which template produced the rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    /// The tokenizer's own chat template
    Tokenizer,
    /// The built-in `<|im_start|>` default
    Builtin,
}

/// The packed prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
    /// Rendered prompt, generation marker and postfix included
    pub text: String,

    /// End-of-sequence marker matching the template that was used
    pub eos_marker: String,

    /// History messages that did not fit, in chronological order
    pub shifted_messages: Vec<ChatMessage>,

    /// Packing statistics
    pub metadata: PackMetadata,
}

/// Statistics about a single packing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackMetadata {
    pub system_tokens: usize,
    pub note_tokens: usize,
    pub history_tokens: usize,
    pub example_tokens: usize,
    /// Budget left after packing; negative when fixed content overflowed
    pub remaining_budget: i64,
    /// Number of history messages admitted
    pub admitted: usize,
    pub examples_included: bool,
    /// Per-message counts served from the cache
    pub cache_hits: usize,
    pub template: Option<TemplateSource>,
}

/// Template-free token counts for one stored message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTokenCount {
    pub token_count: usize,
    /// Count of the rejected alternative, 0 when there is none
    pub rejected_token_count: usize,
}

/// Templated token count for a whole conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTokenCount {
    pub token_count: usize,
    pub message_count: usize,
}
