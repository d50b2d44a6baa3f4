//! Token count cache backends for ctxpack.

pub mod in_memory;
pub mod noop;

pub use in_memory::InMemoryCache;
pub use noop::NoopCache;
