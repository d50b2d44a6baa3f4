//! Cache invalidation on content mutation.
//!
//! Every edit, insert or delete of a stored message must evict the affected
//! token counts for all models before later renders can rely on the cache.
//! So must a change to the character, persona or prompt a conversation is
//! linked to: message text is placeholder-substituted from those, so every
//! message of the conversation renders differently afterwards. Sweeps are
//! prefix-based, so callers never need to know which models were cached.

use crate::cache::TokenCountCache;
use ctxpack_core::cache::CacheScope;
use ctxpack_core::error::{Error, Result};
use ctxpack_core::message::{ConversationId, MessageId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A mutation of stored content that may stale cached counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentChange {
    MessageEdited {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    MessageAdded {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    MessageDeleted {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    /// The conversation's character, persona or prompt assignment changed.
    ///
    /// Placeholders in every message resolve differently now, so
    /// `message_ids` lists all messages of the conversation.
    ConversationLinkageChanged {
        conversation_id: ConversationId,
        message_ids: Vec<MessageId>,
    },
    /// The conversation and its owned messages are gone.
    ConversationDeleted {
        conversation_id: ConversationId,
        message_ids: Vec<MessageId>,
    },
}

impl ContentChange {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::MessageEdited { conversation_id, .. }
            | Self::MessageAdded { conversation_id, .. }
            | Self::MessageDeleted { conversation_id, .. }
            | Self::ConversationLinkageChanged { conversation_id, .. }
            | Self::ConversationDeleted { conversation_id, .. } => conversation_id,
        }
    }

    /// Messages whose per-message counts must be evicted.
    pub fn message_ids(&self) -> &[MessageId] {
        match self {
            Self::MessageEdited { message_id, .. }
            | Self::MessageAdded { message_id, .. }
            | Self::MessageDeleted { message_id, .. } => std::slice::from_ref(message_id),
            Self::ConversationLinkageChanged { message_ids, .. }
            | Self::ConversationDeleted { message_ids, .. } => message_ids,
        }
    }
}

/// Evicts cached counts for every model when content changes.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: TokenCountCache,
}

impl InvalidationCoordinator {
    pub fn new(cache: TokenCountCache) -> Self {
        Self { cache }
    }

    /// Sweep every cached count `change` may have staled.
    ///
    /// Returns the number of evicted entries. Unlike reads and writes, a
    /// failed sweep is returned: the mutation is not safe to acknowledge
    /// while stale counts may still be served.
    pub async fn apply(&self, change: &ContentChange) -> Result<usize> {
        let mut removed = 0;
        for message_id in change.message_ids() {
            removed += self.sweep(CacheScope::Message, &message_id.0).await?;
        }
        removed += self
            .sweep(CacheScope::Conversation, &change.conversation_id().0)
            .await?;

        info!(
            conversation = %change.conversation_id(),
            messages = change.message_ids().len(),
            removed,
            "Token counts invalidated"
        );
        Ok(removed)
    }

    async fn sweep(&self, scope: CacheScope, id: &str) -> Result<usize> {
        self.cache.invalidate_all(scope, id).await.map_err(|e| {
            warn!(scope = %scope, id, error = %e, "Invalidation sweep failed");
            Error::from(e)
        })
    }
}
