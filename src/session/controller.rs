//! Conversation state controller.
//!
//! Phases: `Empty` (no id) -> `PendingCreate` (first submission in flight) ->
//! `Active` (id assigned, message feed attached) <-> `PendingEdit`.
//!
//! Every submission is appended to the view before any remote call. The
//! message feed then reconciles by [`MessageId`]: a snapshot replaces the
//! confirmed messages, and local messages it does not contain yet are kept.
//! Edited text overrides the stored text until a snapshot carries it.
//! Each request remembers the view epoch it started in; a reply arriving after
//! the view moved on is persisted but not shown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::ai::ReplyGenerator;
use crate::ai::prompt::{title_from_reply, title_request};
use crate::core::config::ChatConfig;
use crate::core::errors::{ACCESS_DENIED_TEXT, ChatError, ChatResult};
use crate::core::ids::{ConversationId, IdentityId, MessageId};
use crate::core::model::{Attachment, Conversation, Message, Role, Turn};
use crate::core::route::Route;
use crate::session::SessionFuture;
use crate::session::auth::AuthState;
use crate::store::{DocumentStore, FeedHandle, WriteBatch};

/// Prompt shown before archiving.
pub const ARCHIVE_PROMPT: &str = "Are you sure you want to archive this chat?";
/// Prompt shown before deleting.
pub const DELETE_PROMPT: &str =
    "Are you sure you want to delete this chat? This action cannot be undone.";

/// Asks the user to confirm a destructive action.
pub trait Confirmer: Send + Sync {
    /// Resolve to `true` if the user accepted.
    fn confirm<'a>(&'a self, prompt: &'a str) -> SessionFuture<'a, bool>;
}

/// Controller phase.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Phase {
    /// Fresh composer, no conversation id.
    #[default]
    Empty,
    /// First message submitted, conversation not created yet.
    PendingCreate,
    /// Conversation open with its feed attached.
    Active,
    /// A previous message is being edited and regenerated.
    PendingEdit,
}

/// Snapshot of the conversation view.
#[derive(Clone, Debug, Default)]
pub struct ConversationView {
    /// Current phase.
    pub phase: Phase,
    /// Open conversation.
    pub conversation_id: Option<ConversationId>,
    /// Displayed messages, oldest first.
    pub messages: Vec<Message>,
    /// A submission or edit is in flight; further ones are refused.
    pub pending: bool,
    /// Inline error text.
    pub error: Option<String>,
    unconfirmed: HashSet<MessageId>,
    overrides: HashMap<MessageId, String>,
    epoch: u64,
}

impl ConversationView {
    /// Whether `id` was appended locally and not yet seen in a feed snapshot.
    #[must_use]
    pub fn is_unconfirmed(&self, id: MessageId) -> bool {
        self.unconfirmed.contains(&id)
    }

    /// Whether `id` shows edited text that no snapshot has carried yet.
    #[must_use]
    pub fn is_edit_pending(&self, id: MessageId) -> bool {
        self.overrides.contains_key(&id)
    }

    fn set_content(&mut self, id: MessageId, text: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.content = text.to_string();
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        let epoch = self.epoch.wrapping_add(1);
        *self = Self {
            epoch,
            ..Self::default()
        };
    }

    fn apply_snapshot(&mut self, snapshot: Vec<Message>) {
        let confirmed: HashSet<MessageId> = snapshot.iter().map(|m| m.id).collect();
        self.unconfirmed.retain(|id| !confirmed.contains(id));

        let local: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| self.unconfirmed.contains(&m.id))
            .cloned()
            .collect();
        let mut merged = snapshot;
        for message in &mut merged {
            let Some(text) = self.overrides.get(&message.id) else {
                continue;
            };
            if message.content == *text {
                self.overrides.remove(&message.id);
            } else {
                message.content.clone_from(text);
            }
        }
        merged.extend(local);
        merged.sort_by_key(|m| m.created_at);
        self.messages = merged;
    }
}

struct EditPlan {
    conversation: ConversationId,
    edited: MessageId,
    previous: String,
    reply: Option<MessageId>,
    history: Vec<Turn>,
    epoch: u64,
}

/// Drives one conversation view.
pub struct ConversationController {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn ReplyGenerator>,
    confirmer: Arc<dyn Confirmer>,
    auth: watch::Receiver<AuthState>,
    config: ChatConfig,
    view: Arc<watch::Sender<ConversationView>>,
    feed: Mutex<Option<FeedHandle>>,
}

impl ConversationController {
    /// New controller in the `Empty` phase.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn ReplyGenerator>,
        confirmer: Arc<dyn Confirmer>,
        auth: watch::Receiver<AuthState>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            generator,
            confirmer,
            auth,
            config,
            view: Arc::new(watch::Sender::new(ConversationView::default())),
            feed: Mutex::new(None),
        }
    }

    /// Receiver notified on every view change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationView> {
        self.view.subscribe()
    }

    /// Current view.
    #[must_use]
    pub fn view(&self) -> ConversationView {
        self.view.borrow().clone()
    }

    /// Submit a new user message.
    ///
    /// The message shows up in the view before this returns control to any
    /// remote call. Remote failures are reported through the view's `error`.
    /// Returns where to navigate, if anywhere.
    ///
    /// # Errors
    /// Returns `EmptyMessage`, `TooManyAttachments`, `NotSignedIn` or `Busy`;
    /// the view is unchanged then.
    pub async fn submit(
        &self,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> ChatResult<Option<Route>> {
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if attachments.len() > self.config.max_attachments {
            return Err(ChatError::TooManyAttachments {
                max: self.config.max_attachments,
                got: attachments.len(),
            });
        }
        let owner = self.owner()?;

        let message = Message::user(text, attachments.iter().map(Attachment::meta).collect());
        let mut claim = None;
        self.view.send_if_modified(|v| {
            if v.pending {
                return false;
            }
            v.pending = true;
            v.error = None;
            v.unconfirmed.insert(message.id);
            v.messages.push(message.clone());
            if v.conversation_id.is_none() {
                v.phase = Phase::PendingCreate;
            }
            let history: Vec<Turn> = v.messages.iter().map(Message::turn).collect();
            claim = Some((v.conversation_id, v.epoch, history));
            true
        });
        let (target, epoch, history) = claim.ok_or(ChatError::Busy)?;
        debug!(message = %message.id, "message appended locally");

        match target {
            None => Ok(self.submit_first(owner, message, attachments, epoch).await),
            Some(conversation) => {
                if let Err(err) = self.store.append_message(conversation, &message).await {
                    self.finish(epoch, Some(err));
                    return Ok(None);
                }
                self.request_reply(conversation, history, &attachments, epoch)
                    .await;
                Ok(None)
            }
        }
    }

    async fn submit_first(
        &self,
        owner: IdentityId,
        message: Message,
        attachments: Vec<Attachment>,
        epoch: u64,
    ) -> Option<Route> {
        let conversation = Conversation::new(owner, self.config.placeholder_title.clone());
        if let Err(err) = self.store.create_conversation(&conversation).await {
            self.finish(epoch, Some(err));
            return None;
        }
        let id = conversation.id;
        info!(conversation = %id, "conversation created");

        let claimed = {
            let mut feed = self.feed.lock().await;
            let claimed = self.view.send_if_modified(|v| {
                if v.epoch != epoch {
                    return false;
                }
                v.conversation_id = Some(id);
                v.phase = Phase::Active;
                true
            });
            if claimed {
                *feed = Some(self.attach_feed(id, epoch));
            }
            claimed
        };
        if !claimed {
            debug!(conversation = %id, "view moved on before the conversation was created");
        }

        if let Err(err) = self.store.append_message(id, &message).await {
            self.finish(epoch, Some(err));
            return claimed.then_some(Route::Conversation(id));
        }

        if !message.content.is_empty() {
            tokio::spawn(summarize_title(
                Arc::clone(&self.store),
                Arc::clone(&self.generator),
                id,
                message.content.clone(),
                self.config.title_words,
            ));
        }

        self.request_reply(id, vec![message.turn()], &attachments, epoch)
            .await;
        claimed.then_some(Route::Conversation(id))
    }

    async fn request_reply(
        &self,
        conversation: ConversationId,
        history: Vec<Turn>,
        attachments: &[Attachment],
        epoch: u64,
    ) {
        let text = match self.generator.generate(&history, attachments).await {
            Ok(text) => text,
            Err(err) => {
                self.finish(epoch, Some(err));
                return;
            }
        };

        let reply = Message::model(text);
        let shown = self.view.send_if_modified(|v| {
            if v.epoch != epoch {
                return false;
            }
            v.unconfirmed.insert(reply.id);
            v.messages.push(reply.clone());
            true
        });
        if !shown {
            info!(conversation = %conversation, "late reply persisted without display");
        }

        let result = self.store.append_message(conversation, &reply).await;
        self.finish(epoch, result.err());
    }

    /// Replace the text of the user message at `index`. When the next message
    /// is a model reply, regenerate it from the history up to and including
    /// the edited message. Both writes are persisted.
    ///
    /// # Errors
    /// Returns `EmptyMessage`, `NotSignedIn`, `Busy`, `NoActiveConversation`,
    /// `InvalidMessageIndex` or `NotEditable`; the view is unchanged then.
    pub async fn edit_message(&self, index: usize, new_text: &str) -> ChatResult<()> {
        let new_text = new_text.trim();
        if new_text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.owner()?;

        let mut plan: ChatResult<EditPlan> = Err(ChatError::NoActiveConversation);
        self.view.send_if_modified(|v| {
            plan = prepare_edit(v, index, new_text);
            plan.is_ok()
        });
        let plan = plan?;

        if let Err(err) = self
            .store
            .update_message_content(plan.conversation, plan.edited, new_text)
            .await
        {
            self.view.send_if_modified(|v| {
                if v.epoch != plan.epoch {
                    return false;
                }
                v.overrides.remove(&plan.edited);
                v.set_content(plan.edited, &plan.previous)
            });
            self.finish(plan.epoch, Some(err));
            return Ok(());
        }

        let Some(reply) = plan.reply else {
            self.finish(plan.epoch, None);
            return Ok(());
        };
        debug!(conversation = %plan.conversation, turns = plan.history.len(), "regenerating reply");
        let text = match self.generator.generate(&plan.history, &[]).await {
            Ok(text) => text,
            Err(err) => {
                self.finish(plan.epoch, Some(err));
                return Ok(());
            }
        };

        self.view.send_if_modified(|v| {
            if v.epoch != plan.epoch || !v.set_content(reply, &text) {
                return false;
            }
            v.overrides.insert(reply, text.clone());
            true
        });
        let result = self
            .store
            .update_message_content(plan.conversation, reply, &text)
            .await;
        if result.is_err() {
            self.view.send_if_modified(|v| {
                v.epoch == plan.epoch && v.overrides.remove(&reply).is_some()
            });
        }
        self.finish(plan.epoch, result.err());
        Ok(())
    }

    /// Open an existing conversation by id.
    ///
    /// On a missing or foreign conversation the view shows the access error
    /// and `Some(Route::Home)` is returned.
    ///
    /// # Errors
    /// Returns `NotSignedIn` without an identity.
    pub async fn open(&self, id: ConversationId) -> ChatResult<Option<Route>> {
        let owner = self.owner()?;
        let mut feed = self.feed.lock().await;
        if feed.is_some() && self.view.borrow().conversation_id == Some(id) {
            return Ok(None);
        }
        *feed = None;

        let found = match self.store.get_conversation(id).await {
            Ok(Some(conversation)) if conversation.is_owned_by(&owner) => true,
            Ok(_) => false,
            Err(err) => {
                warn!(conversation = %id, error = %err, "conversation lookup failed");
                false
            }
        };

        let mut epoch = 0;
        self.view.send_modify(|v| {
            v.reset();
            epoch = v.epoch;
            if found {
                v.conversation_id = Some(id);
                v.phase = Phase::Active;
            } else {
                v.error = Some(ACCESS_DENIED_TEXT.to_string());
            }
        });
        if !found {
            info!(conversation = %id, "conversation not accessible");
            return Ok(Some(Route::Home));
        }

        *feed = Some(self.attach_feed(id, epoch));
        info!(conversation = %id, "conversation opened");
        Ok(None)
    }

    /// Back to an empty composer. Closes the message feed.
    pub async fn new_conversation(&self) {
        *self.feed.lock().await = None;
        self.view.send_modify(ConversationView::reset);
    }

    /// Archive `id` after confirmation. Navigates home when it was open.
    ///
    /// # Errors
    /// Returns `NotSignedIn`, or `ConversationNotFound` for a missing or foreign id.
    pub async fn archive(&self, id: ConversationId) -> ChatResult<Option<Route>> {
        self.ensure_owned(id).await?;
        if !self.confirmer.confirm(ARCHIVE_PROMPT).await {
            return Ok(None);
        }
        if let Err(err) = self.store.set_archived(id, true).await {
            self.report(err);
            return Ok(None);
        }
        info!(conversation = %id, "conversation archived");
        Ok(self.leave_if_open(id).await)
    }

    /// Delete `id` and all of its messages in one batch after confirmation.
    /// Navigates home when it was open.
    ///
    /// # Errors
    /// Returns `NotSignedIn`, or `ConversationNotFound` for a missing or foreign id.
    pub async fn delete(&self, id: ConversationId) -> ChatResult<Option<Route>> {
        self.ensure_owned(id).await?;
        if !self.confirmer.confirm(DELETE_PROMPT).await {
            return Ok(None);
        }

        let messages = match self.store.list_messages(id).await {
            Ok(messages) => messages,
            Err(err) => {
                self.report(err);
                return Ok(None);
            }
        };
        let mut batch = WriteBatch::new();
        for message in &messages {
            batch.delete_message(id, message.id);
        }
        batch.delete_conversation(id);
        if let Err(err) = self.store.commit(batch).await {
            self.report(err);
            return Ok(None);
        }
        info!(conversation = %id, messages = messages.len(), "conversation deleted");
        Ok(self.leave_if_open(id).await)
    }

    fn owner(&self) -> ChatResult<IdentityId> {
        self.auth
            .borrow()
            .identity
            .as_ref()
            .map(|identity| identity.id.clone())
            .ok_or(ChatError::NotSignedIn)
    }

    async fn ensure_owned(&self, id: ConversationId) -> ChatResult<()> {
        let owner = self.owner()?;
        match self.store.get_conversation(id).await? {
            Some(conversation) if conversation.is_owned_by(&owner) => Ok(()),
            _ => Err(ChatError::ConversationNotFound(id)),
        }
    }

    async fn leave_if_open(&self, id: ConversationId) -> Option<Route> {
        if self.view.borrow().conversation_id != Some(id) {
            return None;
        }
        self.new_conversation().await;
        Some(Route::Home)
    }

    fn attach_feed(&self, id: ConversationId, epoch: u64) -> FeedHandle {
        let view = Arc::clone(&self.view);
        FeedHandle::forward(self.store.watch_messages(id), move |snapshot| {
            view.send_if_modified(|v| {
                if v.epoch != epoch {
                    return false;
                }
                match snapshot {
                    Ok(messages) => v.apply_snapshot(messages),
                    Err(err) => {
                        warn!(conversation = %id, error = %err, "message feed failed");
                        v.error = Some(format!("Failed to load messages: {err}"));
                    }
                }
                true
            });
        })
    }

    fn report(&self, err: ChatError) {
        warn!(error = %err, "conversation action failed");
        self.view.send_modify(|v| v.error = Some(err.user_message()));
    }

    fn finish(&self, epoch: u64, error: Option<ChatError>) {
        if let Some(err) = &error {
            warn!(error = %err, "chat request failed");
        }
        self.view.send_if_modified(|v| {
            if v.epoch != epoch {
                return false;
            }
            v.pending = false;
            v.phase = if v.conversation_id.is_some() {
                Phase::Active
            } else {
                Phase::Empty
            };
            if let Some(err) = error {
                v.error = Some(err.user_message());
            }
            true
        });
    }
}

fn prepare_edit(v: &mut ConversationView, index: usize, text: &str) -> ChatResult<EditPlan> {
    if v.pending {
        return Err(ChatError::Busy);
    }
    let conversation = v.conversation_id.ok_or(ChatError::NoActiveConversation)?;
    let target = v
        .messages
        .get(index)
        .ok_or(ChatError::InvalidMessageIndex(index))?;
    if target.role != Role::User {
        return Err(ChatError::NotEditable(index));
    }
    let edited = target.id;
    let reply = v
        .messages
        .get(index + 1)
        .filter(|next| next.role == Role::Model)
        .map(|next| next.id);

    let previous = std::mem::replace(&mut v.messages[index].content, text.to_string());
    v.overrides.insert(edited, text.to_string());
    v.pending = true;
    v.error = None;
    v.phase = Phase::PendingEdit;
    Ok(EditPlan {
        conversation,
        edited,
        previous,
        reply,
        history: v.messages[..=index].iter().map(Message::turn).collect(),
        epoch: v.epoch,
    })
}

/// Best-effort title from the first message; failures keep the placeholder.
async fn summarize_title(
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn ReplyGenerator>,
    id: ConversationId,
    text: String,
    words: usize,
) {
    let reply = match generator.generate(&title_request(&text, words), &[]).await {
        Ok(reply) => reply,
        Err(err) => {
            debug!(conversation = %id, error = %err, "title summary skipped");
            return;
        }
    };
    let Some(title) = title_from_reply(&reply, words) else {
        return;
    };
    if let Err(err) = store.update_title(id, &title).await {
        debug!(conversation = %id, error = %err, "title update skipped");
    }
}
