//! Tokenizer backends for ctxpack.
//!
//! - [`WhitespaceTokenizer`] / [`WhitespaceRegistry`] — deterministic, no model files
//! - [`StaticTokenizerRegistry`] — explicit identifier → tokenizer map
//! - `HfTokenizer` / `HfTokenizerRegistry` — Hugging Face `tokenizer.json`
//!   backends (feature `hf`)
//!
//! Hugging Face tokenizers render their own Jinja template through
//! [`JinjaTemplate`]; the fixed [`ChatTemplate`] families cover the rest.

pub mod jinja;
pub mod registry;
pub mod template;
pub mod whitespace;

#[cfg(feature = "hf")]
pub mod hf;

pub use jinja::JinjaTemplate;
pub use registry::StaticTokenizerRegistry;
pub use template::ChatTemplate;
pub use whitespace::{WhitespaceRegistry, WhitespaceTokenizer};

#[cfg(feature = "hf")]
pub use hf::{HfTokenizer, HfTokenizerRegistry};
