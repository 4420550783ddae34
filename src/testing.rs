//! Scripted collaborators for the session and server tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::ai::{GenerateFuture, ReplyGenerator};
use crate::core::errors::{ChatError, ChatResult};
use crate::core::ids::{ConversationId, IdentityId, MessageId};
use crate::core::model::{
    Attachment, Conversation, Identity, Message, Preferences, ProviderIdentity, Turn,
};
use crate::session::SessionFuture;
use crate::session::auth::IdentityProvider;
use crate::session::controller::Confirmer;
use crate::store::{
    BatchWriter, ConversationStore, IdentityStore, MessageStore, SqliteDocumentStore, StoreFuture,
    Subscription, WriteBatch,
};

/// Provider identity with predictable profile fields.
pub fn identity(id: &str) -> ProviderIdentity {
    ProviderIdentity {
        id: IdentityId::new(id).unwrap(),
        display_name: Some(format!("User {id}")),
        email: Some(format!("{}@example.com", id.to_lowercase())),
        avatar_url: None,
    }
}

/// One recorded generation request.
#[derive(Clone, Debug)]
pub struct GenerateCall {
    pub turns: Vec<Turn>,
    pub attachments: Vec<Attachment>,
}

/// Generator replaying queued replies. Title requests are answered separately
/// so that the spawned summary never consumes a queued reply.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ChatResult<String>>>,
    title: Mutex<Option<String>>,
    calls: Mutex<Vec<GenerateCall>>,
    title_calls: Mutex<Vec<GenerateCall>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedGenerator {
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    /// Replies wait for a permit on the returned semaphore.
    pub fn gated<I, S>(replies: I) -> (Self, Arc<Semaphore>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let gate = Arc::new(Semaphore::new(0));
        let generator = Self {
            gate: Some(gate.clone()),
            ..Self::replying(replies)
        };
        (generator, gate)
    }

    pub fn with_title(self, title: &str) -> Self {
        *self.title.lock().unwrap() = Some(title.to_string());
        self
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn title_calls(&self) -> Vec<GenerateCall> {
        self.title_calls.lock().unwrap().clone()
    }

    fn is_title_request(turns: &[Turn]) -> bool {
        turns.len() == 1 && turns[0].content.starts_with("Summarize the following message")
    }
}

impl ReplyGenerator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        turns: &'a [Turn],
        attachments: &'a [Attachment],
    ) -> GenerateFuture<'a, ChatResult<String>> {
        Box::pin(async move {
            let call = GenerateCall {
                turns: turns.to_vec(),
                attachments: attachments.to_vec(),
            };
            if Self::is_title_request(turns) {
                self.title_calls.lock().unwrap().push(call);
                return self
                    .title
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| ChatError::Generation("no title scripted".to_string()));
            }

            self.calls.lock().unwrap().push(call);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Generation("no reply scripted".to_string())))
        })
    }
}

/// Identity provider driven by flags.
pub struct FakeIdentityProvider {
    identity: ProviderIdentity,
    remembered: Mutex<Option<ProviderIdentity>>,
    cancel_next: AtomicBool,
    stale: AtomicBool,
    deleted: AtomicBool,
}

impl FakeIdentityProvider {
    pub fn new(identity: ProviderIdentity) -> Self {
        Self {
            identity,
            remembered: Mutex::new(None),
            cancel_next: AtomicBool::new(false),
            stale: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
        }
    }

    /// Start as if the identity signed in during an earlier visit.
    pub fn remembering(identity: ProviderIdentity) -> Self {
        let provider = Self::new(identity.clone());
        *provider.remembered.lock().unwrap() = Some(identity);
        provider
    }

    pub fn cancel_next_sign_in(&self) {
        self.cancel_next.store(true, Ordering::SeqCst);
    }

    pub fn require_recent_login(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub fn was_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FakeIdentityProvider {
    fn restore(&self) -> SessionFuture<'_, ChatResult<Option<ProviderIdentity>>> {
        Box::pin(async move { Ok(self.remembered.lock().unwrap().clone()) })
    }

    fn sign_in_popup(&self) -> SessionFuture<'_, ChatResult<ProviderIdentity>> {
        Box::pin(async move {
            if self.cancel_next.swap(false, Ordering::SeqCst) {
                return Err(ChatError::SignInCancelled);
            }
            *self.remembered.lock().unwrap() = Some(self.identity.clone());
            Ok(self.identity.clone())
        })
    }

    fn sign_out(&self) -> SessionFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            *self.remembered.lock().unwrap() = None;
            Ok(())
        })
    }

    fn delete_current(&self) -> SessionFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            if self.stale.load(Ordering::SeqCst) {
                return Err(ChatError::StaleCredentials);
            }
            self.deleted.store(true, Ordering::SeqCst);
            *self.remembered.lock().unwrap() = None;
            Ok(())
        })
    }
}

/// Confirmation prompt with a fixed answer.
pub struct FixedConfirm(pub bool);

impl Confirmer for FixedConfirm {
    fn confirm<'a>(&'a self, _prompt: &'a str) -> SessionFuture<'a, bool> {
        let answer = self.0;
        Box::pin(async move { answer })
    }
}

/// Pass-through until closed; then every call waits for one released permit.
pub struct Gate {
    closed: AtomicBool,
    permits: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    async fn pass(&self) {
        if self.closed.load(Ordering::SeqCst) {
            self.permits.acquire().await.unwrap().forget();
        }
    }
}

/// SQLite store whose conversation create/read and message updates can be held.
pub struct GatedStore {
    inner: SqliteDocumentStore,
    pub creates: Gate,
    pub reads: Gate,
    pub updates: Gate,
}

impl GatedStore {
    pub fn new(inner: SqliteDocumentStore) -> Self {
        Self {
            inner,
            creates: Gate::new(),
            reads: Gate::new(),
            updates: Gate::new(),
        }
    }
}

impl IdentityStore for GatedStore {
    fn get_identity(&self, id: &IdentityId) -> StoreFuture<'_, ChatResult<Option<Identity>>> {
        self.inner.get_identity(id)
    }

    fn create_identity(&self, identity: &Identity) -> StoreFuture<'_, ChatResult<()>> {
        self.inner.create_identity(identity)
    }

    fn merge_preferences(
        &self,
        id: &IdentityId,
        preferences: &Preferences,
    ) -> StoreFuture<'_, ChatResult<()>> {
        self.inner.merge_preferences(id, preferences)
    }
}

impl ConversationStore for GatedStore {
    fn create_conversation(&self, conversation: &Conversation) -> StoreFuture<'_, ChatResult<()>> {
        let conversation = conversation.clone();
        Box::pin(async move {
            self.creates.pass().await;
            self.inner.create_conversation(&conversation).await
        })
    }

    fn get_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Option<Conversation>>> {
        Box::pin(async move {
            self.reads.pass().await;
            self.inner.get_conversation(id).await
        })
    }

    fn update_title(&self, id: ConversationId, title: &str) -> StoreFuture<'_, ChatResult<()>> {
        self.inner.update_title(id, title)
    }

    fn set_archived(
        &self,
        id: ConversationId,
        archived: bool,
    ) -> StoreFuture<'_, ChatResult<()>> {
        self.inner.set_archived(id, archived)
    }

    fn list_conversations(
        &self,
        owner: &IdentityId,
        archived: Option<bool>,
    ) -> StoreFuture<'_, ChatResult<Vec<Conversation>>> {
        self.inner.list_conversations(owner, archived)
    }

    fn watch_conversations(
        &self,
        owner: &IdentityId,
        archived: bool,
    ) -> Subscription<Conversation> {
        self.inner.watch_conversations(owner, archived)
    }
}

impl MessageStore for GatedStore {
    fn append_message(
        &self,
        conversation: ConversationId,
        message: &Message,
    ) -> StoreFuture<'_, ChatResult<()>> {
        self.inner.append_message(conversation, message)
    }

    fn update_message_content(
        &self,
        conversation: ConversationId,
        message: MessageId,
        content: &str,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let content = content.to_string();
        Box::pin(async move {
            self.updates.pass().await;
            self.inner
                .update_message_content(conversation, message, &content)
                .await
        })
    }

    fn list_messages(
        &self,
        conversation: ConversationId,
    ) -> StoreFuture<'_, ChatResult<Vec<Message>>> {
        self.inner.list_messages(conversation)
    }

    fn watch_messages(&self, conversation: ConversationId) -> Subscription<Message> {
        self.inner.watch_messages(conversation)
    }
}

impl BatchWriter for GatedStore {
    fn commit(&self, batch: WriteBatch) -> StoreFuture<'_, ChatResult<()>> {
        self.inner.commit(batch)
    }
}
