//! Template fallback engine.
//!
//! Renders and counts role-tagged sequences so that a strict chat template
//! never fails a render outright:
//!
//! 1. Use the tokenizer's own template, or the built-in `<|im_start|>` format
//!    when the tokenizer ships none.
//! 2. If that fails for any reason, repair the sequence (system → user,
//!    coalesce adjacent same-role messages, a single survivor becomes user)
//!    and try step 1 once more.
//! 3. If the retry fails too, surface [`TemplateError::RenderFailed`] with the
//!    tokenizer's template source attached.
//!
//! Repair may change semantics (system instructions become user turns); that
//! trade-off is accepted over a hard failure.

use ctxpack_core::error::{TemplateError, TokenizerError};
use ctxpack_core::message::{ChatMessage, Role};
use ctxpack_core::render::TemplateSource;
use ctxpack_core::tokenizer::Tokenizer;
use tracing::{debug, warn};

/// End-of-sequence marker of the built-in template.
pub const DEFAULT_EOS: &str = "<|im_end|>";

const DEFAULT_GENERATION_PROMPT: &str = "<|im_start|>assistant\n";

// ── Built-in template ─────────────────────────────────────────────────────

/// Render with the built-in template.
///
/// Each message becomes `<|im_start|>ROLE\nCONTENT<|im_end|>\n`. The
/// generation prompt is appended only when requested and the last message
/// is not already an assistant turn.
pub fn render_default_template(messages: &[ChatMessage], add_generation_prompt: bool) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str("<|im_start|>");
        out.push_str(m.role.as_str());
        out.push('\n');
        out.push_str(&m.content);
        out.push_str(DEFAULT_EOS);
        out.push('\n');
    }
    let ends_with_assistant = messages.last().is_some_and(|m| m.role == Role::Assistant);
    if add_generation_prompt && !ends_with_assistant {
        out.push_str(DEFAULT_GENERATION_PROMPT);
    }
    out
}

// ── Repair ────────────────────────────────────────────────────────────────

/// Rewrite a role sequence into a shape strict templates accept.
///
/// System turns become user turns, adjacent same-role turns are merged with a
/// blank line between them, and a lone surviving message is forced to user.
/// Repaired messages carry no id: they are not stored messages anymore.
pub fn repair_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut repaired: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for m in messages {
        let role = match m.role {
            Role::System => Role::User,
            other => other,
        };
        match repaired.last_mut() {
            Some(prev) if prev.role == role => {
                prev.content.push_str("\n\n");
                prev.content.push_str(&m.content);
            }
            _ => repaired.push(ChatMessage::new(role, m.content.clone())),
        }
    }
    if let [only] = repaired.as_mut_slice() {
        only.role = Role::User;
    }
    repaired
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Text rendered for a sequence plus the marker that ends a model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub eos_marker: String,
    pub source: TemplateSource,
}

/// Template-aware rendering and counting for one tokenizer.
pub struct TemplateEngine<'a> {
    tokenizer: &'a dyn Tokenizer,
}

impl<'a> TemplateEngine<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Render `messages` to prompt text.
    pub fn render(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<Rendered, TemplateError> {
        self.with_repair(messages, |msgs| self.render_once(msgs, add_generation_prompt))
    }

    /// Count the tokens of `messages`.
    ///
    /// With `apply_template` the sequence is rendered without a generation
    /// prompt and the result encoded; without it the raw contents are joined
    /// with newlines.
    pub fn tokenize(
        &self,
        messages: &[ChatMessage],
        apply_template: bool,
    ) -> Result<usize, TemplateError> {
        self.with_repair(messages, |msgs| self.tokenize_once(msgs, apply_template))
    }

    fn render_once(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<Rendered, TokenizerError> {
        if self.tokenizer.has_chat_template() {
            let text = self
                .tokenizer
                .apply_chat_template(messages, add_generation_prompt)?;
            Ok(Rendered {
                text,
                eos_marker: self.tokenizer.eos_token().unwrap_or_default().to_string(),
                source: TemplateSource::Tokenizer,
            })
        } else {
            Ok(Rendered {
                text: render_default_template(messages, add_generation_prompt),
                eos_marker: DEFAULT_EOS.to_string(),
                source: TemplateSource::Builtin,
            })
        }
    }

    fn tokenize_once(
        &self,
        messages: &[ChatMessage],
        apply_template: bool,
    ) -> Result<usize, TokenizerError> {
        if apply_template {
            let rendered = self.render_once(messages, false)?;
            self.tokenizer.encode(&rendered.text)
        } else {
            let joined = messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.tokenizer.encode(&joined)
        }
    }

    fn with_repair<T>(
        &self,
        messages: &[ChatMessage],
        attempt: impl Fn(&[ChatMessage]) -> Result<T, TokenizerError>,
    ) -> Result<T, TemplateError> {
        let first = match attempt(messages) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        debug!(
            tokenizer = self.tokenizer.name(),
            error = %first,
            "Template rejected sequence, repairing"
        );

        let repaired = repair_messages(messages);
        attempt(&repaired).map_err(|e| {
            warn!(
                tokenizer = self.tokenizer.name(),
                error = %e,
                "Template rejected repaired sequence"
            );
            TemplateError::RenderFailed {
                cause: e.to_string(),
                template: self.tokenizer.chat_template().map(str::to_string),
            }
        })
    }
}
