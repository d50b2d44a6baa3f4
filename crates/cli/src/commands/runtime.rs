//! Wires the configured tokenizer registry and cache backend into the
//! assembler services.

use ctxpack_assembler::{ContextPacker, TokenCountCache, TokenCounter};
use ctxpack_cache::{InMemoryCache, NoopCache};
use ctxpack_config::{AppConfig, CacheConfig, TokenizerConfig};
use ctxpack_core::cache::CacheBackend;
use ctxpack_core::tokenizer::TokenizerRegistry;
use ctxpack_tokenizers::WhitespaceRegistry;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct Runtime {
    pub config: AppConfig,
    pub packer: ContextPacker,
    pub counter: TokenCounter,
}

impl Runtime {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let registry = build_registry(&config.tokenizer)?;
        let cache = TokenCountCache::new(build_cache(&config.cache));
        info!(
            tokenizer = %config.tokenizer.backend,
            cache = cache.backend_name(),
            "Runtime ready"
        );

        let packer = ContextPacker::new(registry.clone(), cache.clone())
            .with_reserved_overhead(config.assembler.reserved_overhead);
        let counter =
            TokenCounter::new(registry, cache).with_conversation_ttl(config.cache.conversation_ttl());
        Ok(Self {
            config,
            packer,
            counter,
        })
    }
}

pub fn build_registry(
    config: &TokenizerConfig,
) -> Result<Arc<dyn TokenizerRegistry>, Box<dyn std::error::Error>> {
    match config.backend.as_str() {
        "whitespace" => Ok(Arc::new(WhitespaceRegistry)),
        #[cfg(feature = "hf")]
        "huggingface" => {
            let registry = ctxpack_tokenizers::HfTokenizerRegistry::new(
                config.revision.clone(),
                config.cache_dir.clone(),
            )?;
            Ok(Arc::new(registry))
        }
        #[cfg(not(feature = "hf"))]
        "huggingface" => Err("tokenizer backend 'huggingface' requires the `hf` feature".into()),
        other => Err(format!("unknown tokenizer backend '{other}'").into()),
    }
}

pub fn build_cache(config: &CacheConfig) -> Arc<dyn CacheBackend> {
    match config.backend.as_str() {
        "none" => Arc::new(NoopCache),
        _ => Arc::new(InMemoryCache::new().with_default_ttl(config.default_ttl())),
    }
}

/// Read a whole input file, `-` meaning stdin.
pub fn read_input(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let runtime = Runtime::from_config(AppConfig::default()).unwrap();
        assert_eq!(runtime.packer.reserved_overhead(), 50);
    }

    #[test]
    fn cache_backend_follows_config() {
        let mut config = CacheConfig::default();
        assert_eq!(build_cache(&config).name(), "memory");
        config.backend = "none".into();
        assert_eq!(build_cache(&config).name(), "none");
    }

    #[test]
    fn unknown_tokenizer_backend_is_rejected() {
        let config = TokenizerConfig {
            backend: "sentencepiece".into(),
            ..TokenizerConfig::default()
        };
        assert!(build_registry(&config).is_err());
    }
}
