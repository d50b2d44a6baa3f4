//! Chat template formats.
//!
//! Each variant turns a role/content sequence into the exact text layout a
//! model family was trained on. The strict families (`Llama2`, `Mistral`,
//! `Gemma`) refuse sequences their reference templates refuse: a system turn
//! where none is allowed, or roles that do not alternate user/assistant.

use ctxpack_core::error::TokenizerError;
use ctxpack_core::message::{ChatMessage, Role};

const ALTERNATION_ERROR: &str =
    "Conversation roles must alternate user/assistant/user/assistant/...";

/// Chat template format used to structure messages for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTemplate {
    /// `<|im_start|>user\n{content}<|im_end|>\n`
    ChatMl,
    /// `<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\n{content}<|eot_id|>`
    Llama3,
    /// `<|user|>\n{content}</s>\n`
    Zephyr,
    /// `<s>[INST] <<SYS>>\n{system}\n<</SYS>>\n\n{content} [/INST]`
    Llama2,
    /// `<s>[INST] {content} [/INST]{reply}</s>`, no system role
    Mistral,
    /// `<start_of_turn>user\n{content}<end_of_turn>\n`, no system role
    Gemma,
}

impl ChatTemplate {
    /// Recognise a template family from its Jinja source.
    ///
    /// A family only matches when the source also carries that family's own
    /// turn terminator; look-alikes (Phi-3 shares Zephyr's role tags but ends
    /// turns with `<|end|>`) are not recognised.
    pub fn detect(source: &str) -> Option<Self> {
        let has = |marker: &str| source.contains(marker);
        if has("<|im_start|>") && has("<|im_end|>") {
            Some(Self::ChatMl)
        } else if has("<|start_header_id|>") && has("<|eot_id|>") {
            Some(Self::Llama3)
        } else if has("<start_of_turn>") && has("<end_of_turn>") {
            Some(Self::Gemma)
        } else if has("[INST]") && has("[/INST]") && has("<<SYS>>") {
            Some(Self::Llama2)
        } else if has("[INST]") && has("[/INST]") {
            Some(Self::Mistral)
        } else if (has("<|user|>") || has("<|assistant|>"))
            && (has("</s>") || has("eos_token"))
            && !has("<|end|>")
        {
            Some(Self::Zephyr)
        } else {
            None
        }
    }

    /// Canonical template source, as reported for diagnostics.
    pub fn source(&self) -> &'static str {
        match self {
            Self::ChatMl => {
                "{% for message in messages %}{{'<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n'}}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}"
            }
            Self::Llama3 => {
                "{{ bos_token }}{% for message in messages %}{{ '<|start_header_id|>' + message['role'] + '<|end_header_id|>\n\n' + message['content'] + '<|eot_id|>' }}{% endfor %}{% if add_generation_prompt %}{{ '<|start_header_id|>assistant<|end_header_id|>\n\n' }}{% endif %}"
            }
            Self::Zephyr => {
                "{% for message in messages %}{{ '<|' + message['role'] + '|>\n' + message['content'] + eos_token + '\n' }}{% endfor %}{% if add_generation_prompt %}{{ '<|assistant|>\n' }}{% endif %}"
            }
            Self::Llama2 => {
                "{% if messages[0]['role'] == 'system' %}{% set system_message = '<<SYS>>\n' + messages[0]['content'] + '\n<</SYS>>\n\n' %}{% endif %}{% for message in loop_messages %}{% if (message['role'] == 'user') != (loop.index0 % 2 == 0) %}{{ raise_exception('Conversation roles must alternate user/assistant/user/assistant/...') }}{% endif %}{% if message['role'] == 'user' %}{{ bos_token + '[INST] ' + message['content'] + ' [/INST]' }}{% else %}{{ ' ' + message['content'] + ' ' + eos_token }}{% endif %}{% endfor %}"
            }
            Self::Mistral => {
                "{{ bos_token }}{% for message in messages %}{% if (message['role'] == 'user') != (loop.index0 % 2 == 0) %}{{ raise_exception('Conversation roles must alternate user/assistant/user/assistant/...') }}{% endif %}{% if message['role'] == 'user' %}{{ '[INST] ' + message['content'] + ' [/INST]' }}{% else %}{{ message['content'] + eos_token }}{% endif %}{% endfor %}"
            }
            Self::Gemma => {
                "{{ bos_token }}{% if messages[0]['role'] == 'system' %}{{ raise_exception('System role not supported') }}{% endif %}{% for message in messages %}{% if (message['role'] == 'user') != (loop.index0 % 2 == 0) %}{{ raise_exception('Conversation roles must alternate user/assistant/user/assistant/...') }}{% endif %}{{ '<start_of_turn>' + message['role'] + '\n' + message['content'] | trim + '<end_of_turn>\n' }}{% endfor %}{% if add_generation_prompt %}{{'<start_of_turn>model\n'}}{% endif %}"
            }
        }
    }

    /// End-of-sequence marker the family uses.
    pub fn eos_token(&self) -> &'static str {
        match self {
            Self::ChatMl => "<|im_end|>",
            Self::Llama3 => "<|eot_id|>",
            Self::Zephyr | Self::Llama2 | Self::Mistral => "</s>",
            Self::Gemma => "<eos>",
        }
    }

    /// Render messages, optionally opening an assistant turn at the end.
    pub fn render(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String, TokenizerError> {
        match self {
            Self::ChatMl => Ok(Self::format_chatml(messages, add_generation_prompt)),
            Self::Llama3 => Ok(Self::format_llama3(messages, add_generation_prompt)),
            Self::Zephyr => Ok(Self::format_zephyr(messages, add_generation_prompt)),
            Self::Llama2 => Self::format_llama2(messages),
            Self::Mistral => Self::format_mistral(messages),
            Self::Gemma => Self::format_gemma(messages, add_generation_prompt),
        }
    }

    fn format_chatml(messages: &[ChatMessage], add_generation_prompt: bool) -> String {
        let mut prompt = String::new();
        for msg in messages {
            prompt.push_str("<|im_start|>");
            prompt.push_str(msg.role.as_str());
            prompt.push('\n');
            prompt.push_str(&msg.content);
            prompt.push_str("<|im_end|>\n");
        }
        if add_generation_prompt {
            prompt.push_str("<|im_start|>assistant\n");
        }
        prompt
    }

    fn format_llama3(messages: &[ChatMessage], add_generation_prompt: bool) -> String {
        let mut prompt = String::from("<|begin_of_text|>");
        for msg in messages {
            prompt.push_str("<|start_header_id|>");
            prompt.push_str(msg.role.as_str());
            prompt.push_str("<|end_header_id|>\n\n");
            prompt.push_str(&msg.content);
            prompt.push_str("<|eot_id|>");
        }
        if add_generation_prompt {
            prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
        }
        prompt
    }

    fn format_zephyr(messages: &[ChatMessage], add_generation_prompt: bool) -> String {
        let mut prompt = String::new();
        for msg in messages {
            prompt.push_str("<|");
            prompt.push_str(msg.role.as_str());
            prompt.push_str("|>\n");
            prompt.push_str(&msg.content);
            prompt.push_str("</s>\n");
        }
        if add_generation_prompt {
            prompt.push_str("<|assistant|>\n");
        }
        prompt
    }

    fn format_llama2(messages: &[ChatMessage]) -> Result<String, TokenizerError> {
        let (system_prompt, turns) = match messages.split_first() {
            Some((first, rest)) if first.role == Role::System => (Some(&first.content), rest),
            _ => (None, messages),
        };
        if system_prompt.is_some() && turns.is_empty() {
            return Err(TokenizerError::TemplateRejected(
                "System message must be followed by a user message".into(),
            ));
        }
        check_alternation(turns)?;

        let mut prompt = String::new();
        for (i, msg) in turns.iter().enumerate() {
            match msg.role {
                Role::User => {
                    prompt.push_str("<s>[INST] ");
                    if i == 0 {
                        if let Some(system) = system_prompt {
                            prompt.push_str("<<SYS>>\n");
                            prompt.push_str(system);
                            prompt.push_str("\n<</SYS>>\n\n");
                        }
                    }
                    prompt.push_str(&msg.content);
                    prompt.push_str(" [/INST]");
                }
                _ => {
                    prompt.push(' ');
                    prompt.push_str(&msg.content);
                    prompt.push_str(" </s>");
                }
            }
        }
        Ok(prompt)
    }

    fn format_mistral(messages: &[ChatMessage]) -> Result<String, TokenizerError> {
        reject_system(messages, "Only user and assistant roles are supported")?;
        check_alternation(messages)?;

        let mut prompt = String::from("<s>");
        for msg in messages {
            match msg.role {
                Role::User => {
                    prompt.push_str("[INST] ");
                    prompt.push_str(&msg.content);
                    prompt.push_str(" [/INST]");
                }
                _ => {
                    prompt.push_str(&msg.content);
                    prompt.push_str("</s>");
                }
            }
        }
        Ok(prompt)
    }

    fn format_gemma(
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String, TokenizerError> {
        reject_system(messages, "System role not supported")?;
        check_alternation(messages)?;

        let mut prompt = String::from("<bos>");
        for msg in messages {
            let role = match msg.role {
                Role::Assistant => "model",
                _ => "user",
            };
            prompt.push_str("<start_of_turn>");
            prompt.push_str(role);
            prompt.push('\n');
            prompt.push_str(msg.content.trim());
            prompt.push_str("<end_of_turn>\n");
        }
        if add_generation_prompt {
            prompt.push_str("<start_of_turn>model\n");
        }
        Ok(prompt)
    }
}

fn reject_system(messages: &[ChatMessage], reason: &str) -> Result<(), TokenizerError> {
    if messages.iter().any(|m| m.role == Role::System) {
        return Err(TokenizerError::TemplateRejected(reason.into()));
    }
    Ok(())
}

fn check_alternation(messages: &[ChatMessage]) -> Result<(), TokenizerError> {
    for (i, msg) in messages.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        if msg.role != expected {
            return Err(TokenizerError::TemplateRejected(ALTERNATION_ERROR.into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convo() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user("Hello!"),
            ChatMessage::assistant("Hi there."),
        ]
    }

    #[test]
    fn detect_from_source() {
        for template in [
            ChatTemplate::ChatMl,
            ChatTemplate::Llama3,
            ChatTemplate::Zephyr,
            ChatTemplate::Llama2,
            ChatTemplate::Mistral,
            ChatTemplate::Gemma,
        ] {
            assert_eq!(ChatTemplate::detect(template.source()), Some(template));
        }
        assert_eq!(ChatTemplate::detect("{{ messages | tojson }}"), None);
    }

    #[test]
    fn detect_requires_the_family_terminator() {
        let phi3 = "{% for message in messages %}{{'<|user|>\n' + message['content'] + '<|end|>\n'}}{% endfor %}{{ eos_token }}";
        assert_eq!(ChatTemplate::detect(phi3), None);
        assert_eq!(ChatTemplate::detect("{{ '<|user|>\n' + content + '</s>' }}"), Some(ChatTemplate::Zephyr));
        assert_eq!(ChatTemplate::detect("{{ '<|im_start|>' + content }}"), None);
        assert_eq!(ChatTemplate::detect("{{ '[INST] ' + content }}"), None);
    }

    #[test]
    fn chatml_layout() {
        let prompt = ChatTemplate::ChatMl.render(&convo(), true).unwrap();
        assert!(prompt.starts_with("<|im_start|>system\nYou are helpful.<|im_end|>\n"));
        assert!(prompt.contains("<|im_start|>assistant\nHi there.<|im_end|>\n"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));

        let no_gen = ChatTemplate::ChatMl.render(&convo(), false).unwrap();
        assert!(no_gen.ends_with("Hi there.<|im_end|>\n"));
    }

    #[test]
    fn llama3_layout() {
        let prompt = ChatTemplate::Llama3.render(&[ChatMessage::user("Hello")], true).unwrap();
        assert!(prompt.starts_with("<|begin_of_text|>"));
        assert!(prompt.contains("<|start_header_id|>user<|end_header_id|>\n\nHello<|eot_id|>"));
        assert!(prompt.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn zephyr_layout() {
        let prompt = ChatTemplate::Zephyr.render(&convo(), true).unwrap();
        assert!(prompt.contains("<|system|>\nYou are helpful.</s>\n"));
        assert!(prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn llama2_folds_system_into_first_turn() {
        let prompt = ChatTemplate::Llama2.render(&convo(), true).unwrap();
        assert_eq!(
            prompt,
            "<s>[INST] <<SYS>>\nYou are helpful.\n<</SYS>>\n\nHello! [/INST] Hi there. </s>"
        );
    }

    #[test]
    fn llama2_rejects_lone_system() {
        let err = ChatTemplate::Llama2
            .render(&[ChatMessage::system("sys")], false)
            .unwrap_err();
        assert!(matches!(err, TokenizerError::TemplateRejected(_)));
    }

    #[test]
    fn strict_templates_reject_system_role() {
        for template in [ChatTemplate::Mistral, ChatTemplate::Gemma] {
            let err = template.render(&convo(), false).unwrap_err();
            assert!(matches!(err, TokenizerError::TemplateRejected(_)));
        }
    }

    #[test]
    fn strict_templates_reject_repeated_roles() {
        let msgs = vec![
            ChatMessage::user("a"),
            ChatMessage::assistant("b"),
            ChatMessage::assistant("c"),
        ];
        for template in [ChatTemplate::Llama2, ChatTemplate::Mistral, ChatTemplate::Gemma] {
            let err = template.render(&msgs, false).unwrap_err();
            assert!(err.to_string().contains("alternate"));
        }
    }

    #[test]
    fn gemma_names_assistant_model() {
        let msgs = vec![ChatMessage::user("Hi"), ChatMessage::assistant(" Hello ")];
        let prompt = ChatTemplate::Gemma.render(&msgs, true).unwrap();
        assert!(prompt.contains("<start_of_turn>model\nHello<end_of_turn>\n"));
        assert!(prompt.ends_with("<start_of_turn>model\n"));
    }
}
