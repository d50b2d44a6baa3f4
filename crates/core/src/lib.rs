//! # ctxpack Core
//!
//! Domain types, traits, and error definitions for the ctxpack conversation
//! assembler. This crate has **no framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Seams
//!
//! The two external capabilities the assembler depends on are traits here:
//! - [`Tokenizer`] / [`TokenizerRegistry`] — chat-template rendering and counting
//! - [`CacheBackend`] — the shared token-count store
//!
//! Implementations live in `ctxpack-tokenizers` and `ctxpack-cache`, and are
//! passed into the assembler explicitly rather than held as process globals.

pub mod cache;
pub mod error;
pub mod message;
pub mod render;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use cache::{CacheBackend, CacheKey, CacheScope};
pub use error::{CacheError, Error, Result, TemplateError, TokenizerError};
pub use message::{ChatMessage, ConversationId, MessageId, Role};
pub use render::{
    ConversationTokenCount, MessageTokenCount, PackMetadata, RenderRequest, RenderResult,
    TemplateSource,
};
pub use tokenizer::{Tokenizer, TokenizerRegistry};
