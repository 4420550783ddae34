//! Document store: identities, conversations and their messages.
//!
//! The store is injected into the session controllers as
//! `Arc<dyn DocumentStore>`. It offers point reads, ordered queries, live
//! queries ([`Subscription`]) and atomic batch writes ([`WriteBatch`]).
//! Ownership is checked by the callers; the store itself is scope-agnostic.

pub mod batch;
pub mod sqlite_store;
pub mod subscription;

use std::future::Future;
use std::pin::Pin;

use crate::core::errors::ChatResult;
use crate::core::ids::{ConversationId, IdentityId, MessageId};
use crate::core::model::{Conversation, Identity, Message, Preferences};

pub use batch::{WriteBatch, WriteOp};
pub use sqlite_store::SqliteDocumentStore;
pub use subscription::{ChangeEvent, FeedHandle, Subscription};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Profile records (`identities` collection).
pub trait IdentityStore: Send + Sync {
    /// Point read of a profile.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_identity(&self, id: &IdentityId) -> StoreFuture<'_, ChatResult<Option<Identity>>>;

    /// Create a profile. Overwrites nothing: an existing record is kept.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_identity(&self, identity: &Identity) -> StoreFuture<'_, ChatResult<()>>;

    /// Merge preference fields into the profile, keeping fields not set in `preferences`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn merge_preferences(
        &self,
        id: &IdentityId,
        preferences: &Preferences,
    ) -> StoreFuture<'_, ChatResult<()>>;
}

/// Conversation documents (`conversations` collection).
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_conversation(&self, conversation: &Conversation) -> StoreFuture<'_, ChatResult<()>>;

    /// Point read by id, regardless of the archived flag.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>>;

    /// Replace the title.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` if the record is gone.
    fn update_title(&self, id: ConversationId, title: &str) -> StoreFuture<'_, ChatResult<()>>;

    /// Set or clear the archived flag.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` if the record is gone.
    fn set_archived(&self, id: ConversationId, archived: bool)
    -> StoreFuture<'_, ChatResult<()>>;

    /// Conversations of `owner`, newest first. `archived = None` returns both kinds.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_conversations(
        &self,
        owner: &IdentityId,
        archived: Option<bool>,
    ) -> StoreFuture<'_, ChatResult<Vec<Conversation>>>;

    /// Live query over [`ConversationStore::list_conversations`] with a fixed archived flag.
    fn watch_conversations(&self, owner: &IdentityId, archived: bool)
    -> Subscription<Conversation>;
}

/// Message documents (`conversations/{id}/messages` sub-collection).
pub trait MessageStore: Send + Sync {
    /// Append a message.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn append_message(
        &self,
        conversation: ConversationId,
        message: &Message,
    ) -> StoreFuture<'_, ChatResult<()>>;

    /// Replace a message's content in place.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn update_message_content(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: &str,
    ) -> StoreFuture<'_, ChatResult<()>>;

    /// Messages of a conversation, oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn list_messages(&self, conversation: ConversationId)
    -> StoreFuture<'_, ChatResult<Vec<Message>>>;

    /// Live query over [`MessageStore::list_messages`].
    fn watch_messages(&self, conversation: ConversationId) -> Subscription<Message>;
}

/// Atomic multi-document writes.
pub trait BatchWriter: Send + Sync {
    /// Apply every operation or none.
    ///
    /// # Errors
    /// Returns an error if storage access fails; nothing is applied then.
    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, ChatResult<()>>;
}

/// Everything the session controllers need from the backend.
pub trait DocumentStore: IdentityStore + ConversationStore + MessageStore + BatchWriter {}

impl<T> DocumentStore for T where T: IdentityStore + ConversationStore + MessageStore + BatchWriter {}
