//! # ctxpack Assembler
//!
//! Packs a conversation into a model's context window:
//!
//! - [`ContextPacker`] — newest-first history admission under a signed budget
//! - [`TemplateEngine`] — chat template rendering with role-sequence repair
//! - [`TokenCounter`] — standalone message and conversation counts
//! - [`InvalidationCoordinator`] — cache eviction on content mutation
//!
//! The tokenizer registry and cache backend are passed in explicitly; the
//! assembler holds no process-wide state.

pub mod cache;
pub mod counter;
pub mod fallback;
pub mod invalidation;
pub mod packer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cache::TokenCountCache;
pub use counter::{DEFAULT_CONVERSATION_TTL, TokenCounter};
pub use fallback::{DEFAULT_EOS, Rendered, TemplateEngine, render_default_template, repair_messages};
pub use invalidation::{ContentChange, InvalidationCoordinator};
pub use packer::{ContextPacker, DEFAULT_RESERVED_OVERHEAD};
