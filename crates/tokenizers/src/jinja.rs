//! Jinja chat templates.
//!
//! Hugging Face tokenizers ship their chat template as Jinja source in
//! `tokenizer_config.json`. [`JinjaTemplate`] runs that source as-is so a
//! model gets exactly the layout it was trained on, including default system
//! prompts, content trimming and its own role checks. The environment mirrors
//! the one `transformers` renders with: `trim_blocks`, `lstrip_blocks`,
//! Python string methods, and a `raise_exception` function.

use ctxpack_core::error::TokenizerError;
use ctxpack_core::message::ChatMessage;
use minijinja::{Environment, Error, ErrorKind, Value, context};

const TEMPLATE_NAME: &str = "chat";

/// A compiled chat template plus the special tokens it may reference.
pub struct JinjaTemplate {
    env: Environment<'static>,
    source: String,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

impl std::fmt::Debug for JinjaTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinjaTemplate")
            .field("bos_token", &self.bos_token)
            .field("eos_token", &self.eos_token)
            .finish_non_exhaustive()
    }
}

fn raise_exception(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

impl JinjaTemplate {
    /// Compile `source`. Fails when the source is not valid Jinja.
    pub fn compile(
        source: impl Into<String>,
        bos_token: Option<String>,
        eos_token: Option<String>,
    ) -> Result<Self, TokenizerError> {
        let source = source.into();
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_function("raise_exception", raise_exception);
        env.add_template_owned(TEMPLATE_NAME, source.clone())
            .map_err(|e| TokenizerError::TemplateRejected(format!("invalid chat template: {e}")))?;

        Ok(Self {
            env,
            source,
            bos_token,
            eos_token,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    /// Render `messages`. A `raise_exception` call or any runtime error of
    /// the template is a rejection of the sequence.
    pub fn render(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String, TokenizerError> {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| context! { role => m.role.as_str(), content => m.content.as_str() })
            .collect();
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| TokenizerError::TemplateRejected(e.to_string()))?;
        template
            .render(context! {
                messages,
                add_generation_prompt,
                bos_token => self.bos_token.as_deref().unwrap_or_default(),
                eos_token => self.eos_token.as_deref().unwrap_or_default(),
            })
            .map_err(|e| TokenizerError::TemplateRejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatTemplate;

    const QWEN2: &str = r#"{% for message in messages %}{% if loop.first and messages[0]['role'] != 'system' %}{{ '<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n' }}{% endif %}{{'<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n'}}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}"#;

    const PHI3: &str = r#"{% for message in messages %}{% if message['role'] == 'system' %}{{'<|system|>\n' + message['content'] + '<|end|>\n'}}{% elif message['role'] == 'user' %}{{'<|user|>\n' + message['content'] + '<|end|>\n'}}{% elif message['role'] == 'assistant' %}{{'<|assistant|>\n' + message['content'] + '<|end|>\n'}}{% endif %}{% endfor %}{% if add_generation_prompt %}{{ '<|assistant|>\n' }}{% else %}{{ eos_token }}{% endif %}"#;

    const LLAMA3: &str = r#"{% set loop_messages = messages %}{% for message in loop_messages %}{% set content = '<|start_header_id|>' + message['role'] + '<|end_header_id|>\n\n'+ message['content'] | trim + '<|eot_id|>' %}{% if loop.index0 == 0 %}{% set content = bos_token + content %}{% endif %}{{ content }}{% endfor %}{% if add_generation_prompt %}{{ '<|start_header_id|>assistant<|end_header_id|>\n\n' }}{% endif %}"#;

    const MISTRAL_V3: &str = r#"{{ bos_token }}{% for message in messages %}{% if message['role'] == 'system' %}{% if not loop.first %}{{ raise_exception('System message must come first') }}{% endif %}{% elif message['role'] == 'user' %}{% if loop.index0 == 1 and messages[0]['role'] == 'system' %}{{ '[INST] ' + messages[0]['content'] + '\n\n' + message['content'] + '[/INST]' }}{% else %}{{ '[INST] ' + message['content'] + '[/INST]' }}{% endif %}{% elif message['role'] == 'assistant' %}{{ ' ' + message['content'] + eos_token }}{% endif %}{% endfor %}"#;

    fn template(source: &str) -> JinjaTemplate {
        JinjaTemplate::compile(source, Some("<s>".into()), Some("</s>".into())).unwrap()
    }

    #[test]
    fn default_system_prompt_is_injected() {
        let prompt = template(QWEN2).render(&[ChatMessage::user("Hi")], true).unwrap();
        assert_eq!(
            prompt,
            "<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n\
             <|im_start|>user\nHi<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn phi3_keeps_its_own_terminator() {
        let tpl = JinjaTemplate::compile(PHI3, None, Some("<|endoftext|>".into())).unwrap();
        let msgs = [ChatMessage::user("Hi"), ChatMessage::assistant("Hello")];
        let prompt = tpl.render(&msgs, false).unwrap();
        assert_eq!(prompt, "<|user|>\nHi<|end|>\n<|assistant|>\nHello<|end|>\n<|endoftext|>");
        assert!(!prompt.contains("</s>"));
    }

    #[test]
    fn filters_apply_to_content() {
        let tpl = JinjaTemplate::compile(LLAMA3, Some("<|begin_of_text|>".into()), None).unwrap();
        let prompt = tpl.render(&[ChatMessage::user("  Hello \n")], true).unwrap();
        assert_eq!(
            prompt,
            "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\nHello<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n"
        );
    }

    #[test]
    fn system_turn_accepted_where_the_template_allows_it() {
        let msgs = [ChatMessage::system("Be brief."), ChatMessage::user("Hi")];
        let prompt = template(MISTRAL_V3).render(&msgs, false).unwrap();
        assert_eq!(prompt, "<s>[INST] Be brief.\n\nHi[/INST]");
    }

    #[test]
    fn raise_exception_is_a_rejection() {
        let tpl = template(ChatTemplate::Gemma.source());
        let err = tpl
            .render(&[ChatMessage::system("sys"), ChatMessage::user("Hi")], false)
            .unwrap_err();
        assert!(matches!(err, TokenizerError::TemplateRejected(_)));
        assert!(err.to_string().contains("System role not supported"));

        assert!(tpl.render(&[ChatMessage::user("Hi")], true).is_ok());
    }

    #[test]
    fn python_string_methods_are_available() {
        let tpl = template("{{ messages[0]['content'].strip().upper() }}");
        assert_eq!(tpl.render(&[ChatMessage::user(" hi ")], false).unwrap(), "HI");
    }

    #[test]
    fn invalid_source_fails_to_compile() {
        let Err(err) = JinjaTemplate::compile("{% for %}", None, None) else {
            panic!("compiled");
        };
        assert!(err.to_string().contains("invalid chat template"));
    }
}
