//! Hugging Face tokenizer backend.
//!
//! Loads `tokenizer.json` (vocabulary and pre-tokenizer) and, when present,
//! `tokenizer_config.json` (chat template and EOS token) either from a local
//! directory or from the Hugging Face Hub. Loaded tokenizers are memoised per
//! identifier, since loading is the expensive part.
//!
//! The chat template runs as Jinja. Only a source that fails to compile falls
//! back to a recognised [`ChatTemplate`] family, and an unrecognised one to no
//! template at all.

use crate::jinja::JinjaTemplate;
use crate::template::ChatTemplate;
use ctxpack_core::error::TokenizerError;
use ctxpack_core::message::ChatMessage;
use ctxpack_core::tokenizer::{Tokenizer, TokenizerRegistry};
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// How a tokenizer's chat template is rendered.
enum LoadedTemplate {
    Jinja(JinjaTemplate),
    Family { template: ChatTemplate, source: String },
}

/// A `tokenizer.json` tokenizer with the chat template from its config.
pub struct HfTokenizer {
    name: String,
    inner: tokenizers::Tokenizer,
    template: Option<LoadedTemplate>,
    eos_token: Option<String>,
}

impl HfTokenizer {
    /// Load from a directory holding `tokenizer.json` and optionally
    /// `tokenizer_config.json`.
    pub fn from_dir(name: &str, dir: &Path) -> Result<Self, TokenizerError> {
        let config_path = dir.join("tokenizer_config.json");
        let config_path = config_path.exists().then_some(config_path);
        Self::from_files(name, &dir.join("tokenizer.json"), config_path.as_deref())
    }

    pub fn from_files(
        name: &str,
        tokenizer_path: &Path,
        config_path: Option<&Path>,
    ) -> Result<Self, TokenizerError> {
        let inner = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            TokenizerError::Unavailable {
                model: name.to_string(),
                reason: format!("failed to load {}: {e}", tokenizer_path.display()),
            }
        })?;

        let config = match config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| TokenizerError::Unavailable {
                    model: name.to_string(),
                    reason: format!("failed to read {}: {e}", path.display()),
                })?;
                serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| {
                    TokenizerError::Unavailable {
                        model: name.to_string(),
                        reason: format!("invalid {}: {e}", path.display()),
                    }
                })?
            }
            None => serde_json::Value::Null,
        };

        let eos_token = special_token_from_config(&config, "eos_token");
        let template = chat_template_from_config(&config)
            .and_then(|source| load_template(name, source, &config, eos_token.clone()));

        Ok(Self {
            name: name.to_string(),
            inner,
            template,
            eos_token,
        })
    }
}

fn load_template(
    model: &str,
    source: String,
    config: &serde_json::Value,
    eos_token: Option<String>,
) -> Option<LoadedTemplate> {
    let bos_token = special_token_from_config(config, "bos_token");
    match JinjaTemplate::compile(source.clone(), bos_token, eos_token) {
        Ok(jinja) => Some(LoadedTemplate::Jinja(jinja)),
        Err(e) => match ChatTemplate::detect(&source) {
            Some(template) => {
                warn!(model, error = %e, family = ?template, "Chat template rendered by family");
                Some(LoadedTemplate::Family { template, source })
            }
            None => {
                warn!(
                    model,
                    error = %e,
                    "Unusable chat template, rendering with the built-in default"
                );
                None
            }
        },
    }
}

impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn chat_template(&self) -> Option<&str> {
        match self.template.as_ref()? {
            LoadedTemplate::Jinja(jinja) => Some(jinja.source()),
            LoadedTemplate::Family { source, .. } => Some(source),
        }
    }

    fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref().or(match &self.template {
            Some(LoadedTemplate::Family { template, .. }) => Some(template.eos_token()),
            _ => None,
        })
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String, TokenizerError> {
        match &self.template {
            Some(LoadedTemplate::Jinja(jinja)) => jinja.render(messages, add_generation_prompt),
            Some(LoadedTemplate::Family { template, .. }) => {
                template.render(messages, add_generation_prompt)
            }
            None => Err(TokenizerError::NoChatTemplate),
        }
    }

    fn encode(&self, text: &str) -> Result<usize, TokenizerError> {
        self.inner
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| TokenizerError::Encoding(e.to_string()))
    }
}

/// `chat_template` is either a string or a list of named templates.
fn chat_template_from_config(config: &serde_json::Value) -> Option<String> {
    match config.get("chat_template")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(named) => {
            let pick = named
                .iter()
                .find(|t| t.get("name").and_then(|n| n.as_str()) == Some("default"))
                .or_else(|| named.first())?;
            pick.get("template")?.as_str().map(str::to_string)
        }
        _ => None,
    }
}

/// Special tokens are either a string or an added-token object with `content`.
fn special_token_from_config(config: &serde_json::Value, field: &str) -> Option<String> {
    match config.get(field)? {
        serde_json::Value::String(s) => Some(s.clone()),
        obj @ serde_json::Value::Object(_) => {
            obj.get("content")?.as_str().map(str::to_string)
        }
        _ => None,
    }
}

/// Resolves identifiers to [`HfTokenizer`]s: a local directory containing
/// `tokenizer.json`, otherwise a Hub repository id.
pub struct HfTokenizerRegistry {
    api: Api,
    revision: String,
    loaded: RwLock<HashMap<String, Arc<dyn Tokenizer>>>,
}

impl HfTokenizerRegistry {
    pub fn new(revision: impl Into<String>, cache_dir: Option<PathBuf>) -> Result<Self, TokenizerError> {
        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(dir) = cache_dir {
            builder = builder.with_cache_dir(dir);
        }
        let api = builder.build().map_err(|e| TokenizerError::Unavailable {
            model: String::new(),
            reason: format!("Failed to initialize HuggingFace Hub API: {e}"),
        })?;

        Ok(Self {
            api,
            revision: revision.into(),
            loaded: RwLock::new(HashMap::new()),
        })
    }

    fn load(&self, model_identifier: &str) -> Result<HfTokenizer, TokenizerError> {
        let local = Path::new(model_identifier);
        if local.join("tokenizer.json").exists() {
            info!(path = %local.display(), "Loading tokenizer from local directory");
            return HfTokenizer::from_dir(model_identifier, local);
        }

        info!(
            model = model_identifier,
            revision = %self.revision,
            "Downloading/loading tokenizer"
        );
        let repo = self.api.repo(Repo::with_revision(
            model_identifier.to_string(),
            RepoType::Model,
            self.revision.clone(),
        ));

        let tokenizer_path = repo.get("tokenizer.json").map_err(|e| TokenizerError::Unavailable {
            model: model_identifier.to_string(),
            reason: format!("Failed to download tokenizer: {e}"),
        })?;

        // Not every repository ships a config; no config means no template.
        let config_path = match repo.get("tokenizer_config.json") {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(model = model_identifier, error = %e, "No tokenizer_config.json");
                None
            }
        };

        HfTokenizer::from_files(model_identifier, &tokenizer_path, config_path.as_deref())
    }
}

impl TokenizerRegistry for HfTokenizerRegistry {
    fn resolve(&self, model_identifier: &str) -> Result<Arc<dyn Tokenizer>, TokenizerError> {
        if let Some(found) = self
            .loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model_identifier)
        {
            return Ok(found.clone());
        }

        let tokenizer: Arc<dyn Tokenizer> = Arc::new(self.load(model_identifier)?);
        self.loaded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(model_identifier.to_string(), tokenizer.clone());
        Ok(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_string_form() {
        let config = json!({ "chat_template": "{{'<|im_start|>'}}" });
        assert_eq!(
            chat_template_from_config(&config).as_deref(),
            Some("{{'<|im_start|>'}}")
        );
    }

    #[test]
    fn template_named_list_prefers_default() {
        let config = json!({
            "chat_template": [
                { "name": "tool_use", "template": "tools" },
                { "name": "default", "template": "[INST]" }
            ]
        });
        assert_eq!(chat_template_from_config(&config).as_deref(), Some("[INST]"));
    }

    #[test]
    fn missing_template_is_none() {
        assert!(chat_template_from_config(&json!({})).is_none());
        assert!(chat_template_from_config(&serde_json::Value::Null).is_none());
    }

    #[test]
    fn special_token_forms() {
        assert_eq!(
            special_token_from_config(&json!({ "eos_token": "</s>" }), "eos_token").as_deref(),
            Some("</s>")
        );
        assert_eq!(
            special_token_from_config(
                &json!({ "bos_token": { "content": "<s>", "lstrip": false } }),
                "bos_token"
            )
            .as_deref(),
            Some("<s>")
        );
        assert!(special_token_from_config(&json!({ "eos_token": null }), "eos_token").is_none());
    }

    #[test]
    fn config_template_runs_as_jinja() {
        let config = json!({
            "chat_template": "{% for message in messages %}{{'<|user|>\n' + message['content'] + '<|end|>\n'}}{% endfor %}{% if add_generation_prompt %}{{ '<|assistant|>\n' }}{% endif %}",
            "eos_token": "<|endoftext|>"
        });
        let source = chat_template_from_config(&config).unwrap();
        let Some(LoadedTemplate::Jinja(jinja)) = load_template("phi", source, &config, None) else {
            panic!("template did not compile");
        };
        let text = jinja.render(&[ChatMessage::user("Hi")], true).unwrap();
        assert_eq!(text, "<|user|>\nHi<|end|>\n<|assistant|>\n");
    }

    #[test]
    fn uncompilable_template_falls_back_to_family_or_none() {
        let config = json!({});
        let broken_chatml = "{% for %}<|im_start|>user<|im_end|>".to_string();
        assert!(matches!(
            load_template("m", broken_chatml, &config, None),
            Some(LoadedTemplate::Family { template: ChatTemplate::ChatMl, .. })
        ));
        assert!(load_template("m", "{% for %}".to_string(), &config, None).is_none());
    }
}
