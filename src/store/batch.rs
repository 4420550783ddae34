//! Atomic batch writes.

use crate::core::ids::{ConversationId, IdentityId, MessageId};

/// One write inside a [`WriteBatch`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WriteOp {
    /// Remove one message.
    DeleteMessage {
        /// Parent conversation.
        conversation: ConversationId,
        /// Message to remove.
        message: MessageId,
    },
    /// Remove a conversation record (messages are separate operations).
    DeleteConversation(ConversationId),
    /// Remove a profile record.
    DeleteIdentity(IdentityId),
}

/// Ordered list of writes committed atomically.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Queue a message deletion.
    pub fn delete_message(&mut self, conversation: ConversationId, message: MessageId) -> &mut Self {
        self.ops.push(WriteOp::DeleteMessage {
            conversation,
            message,
        });
        self
    }

    /// Queue a conversation deletion.
    pub fn delete_conversation(&mut self, conversation: ConversationId) -> &mut Self {
        self.ops.push(WriteOp::DeleteConversation(conversation));
        self
    }

    /// Queue a profile deletion.
    pub fn delete_identity(&mut self, identity: IdentityId) -> &mut Self {
        self.ops.push(WriteOp::DeleteIdentity(identity));
        self
    }

    /// Number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consume into the queued operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
