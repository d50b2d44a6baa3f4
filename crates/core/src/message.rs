//! Message domain types.
//!
//! These are the value objects the assembler packs: a persisted conversation
//! turn carries its store identifier, while ephemeral turns (author's note,
//! example dialogue, unsaved proposals) carry none and are never cached.

use serde::{Deserialize, Serialize};

/// Identifier of a persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a persisted conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (prompt, author's note)
    System,
    /// The end user (or persona)
    User,
    /// The AI assistant (or character)
    Assistant,
}

impl Role {
    /// Map a stored author string onto a role.
    ///
    /// `"user"` and `"assistant"` match case-insensitively; any other author
    /// is treated as system.
    pub fn from_author(author: &str) -> Self {
        match author.to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single role/content turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store identifier; `None` for ephemeral messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Who sent this message
    pub role: Role,

    /// Fully placeholder-substituted text
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach a store identifier, marking the message as persisted.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(MessageId(id.into()));
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}
