//! Chat list subscriber.
//!
//! Holds two live queries for the signed-in identity (unarchived and archived
//! conversations, newest first) and replaces both whenever the identity
//! changes. The first unarchived snapshot after a sign-in feeds the
//! [`FirstLoginRedirect`] guard.

use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::errors::{ChatError, ChatResult};
use crate::core::ids::{ConversationId, IdentityId};
use crate::core::model::Conversation;
use crate::core::route::Route;
use crate::session::auth::AuthState;
use crate::session::buckets::{Buckets, bucket};
use crate::session::redirect::FirstLoginRedirect;
use crate::store::{DocumentStore, FeedHandle};

/// Published list state.
#[derive(Clone, Debug, Default)]
pub struct ChatListView {
    /// Identity the lists belong to.
    pub identity: Option<IdentityId>,
    /// Unarchived conversations, newest first.
    pub active: Vec<Conversation>,
    /// Archived conversations, newest first.
    pub archived: Vec<Conversation>,
    /// First unarchived snapshot received.
    pub loaded: bool,
    /// First archived snapshot received.
    pub archived_loaded: bool,
    /// Inline error text.
    pub error: Option<String>,
    redirect: Option<Route>,
    guard: FirstLoginRedirect,
    epoch: u64,
}

impl ChatListView {
    /// Unarchived conversations split into calendar buckets.
    #[must_use]
    pub fn buckets<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Buckets {
        bucket(&self.active, now)
    }
}

#[derive(Clone, Copy)]
enum Feed {
    Active,
    Archived,
}

/// Keeps the sidebar lists in sync with the store.
pub struct ChatList {
    store: Arc<dyn DocumentStore>,
    view: Arc<watch::Sender<ChatListView>>,
    feeds: Mutex<Vec<FeedHandle>>,
}

impl ChatList {
    /// New list with no identity.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            view: Arc::new(watch::Sender::new(ChatListView::default())),
            feeds: Mutex::new(Vec::new()),
        }
    }

    /// Receiver notified on every list change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatListView> {
        self.view.subscribe()
    }

    /// Current lists.
    #[must_use]
    pub fn view(&self) -> ChatListView {
        self.view.borrow().clone()
    }

    /// Close the feeds of the previous identity and open both for `identity`.
    pub async fn set_identity(&self, identity: Option<IdentityId>) {
        let mut feeds = self.feeds.lock().await;
        if !feeds.is_empty() && self.view.borrow().identity == identity {
            return;
        }
        feeds.clear();

        let mut epoch = 0;
        self.view.send_modify(|v| {
            v.guard.observe_identity(identity.as_ref());
            v.epoch = v.epoch.wrapping_add(1);
            epoch = v.epoch;
            v.identity.clone_from(&identity);
            v.active.clear();
            v.archived.clear();
            v.loaded = false;
            v.archived_loaded = false;
            v.error = None;
        });

        let Some(owner) = identity else {
            debug!("chat list cleared");
            return;
        };
        feeds.push(self.attach(&owner, Feed::Active, epoch));
        feeds.push(self.attach(&owner, Feed::Archived, epoch));
        info!(identity = %owner, "chat list feeds attached");
    }

    /// Apply every identity change published by an auth session.
    #[must_use]
    pub fn follow(self: Arc<Self>, mut auth: watch::Receiver<AuthState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let identity = auth
                    .borrow_and_update()
                    .identity
                    .as_ref()
                    .map(|identity| identity.id.clone());
                self.set_identity(identity).await;
                if auth.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Take the pending first-login redirect, if it fired.
    pub fn poll_redirect(&self) -> Option<Route> {
        let mut route = None;
        self.view.send_if_modified(|v| {
            route = v.redirect.take();
            route.is_some()
        });
        route
    }

    /// Move an archived conversation back into the default list.
    ///
    /// # Errors
    /// Returns `NotSignedIn` without an identity and `ConversationNotFound`
    /// for a missing or foreign id.
    pub async fn unarchive(&self, id: ConversationId) -> ChatResult<()> {
        let owner = self
            .view
            .borrow()
            .identity
            .clone()
            .ok_or(ChatError::NotSignedIn)?;
        match self.store.get_conversation(id).await? {
            Some(conversation) if conversation.is_owned_by(&owner) => {}
            _ => return Err(ChatError::ConversationNotFound(id)),
        }
        self.store.set_archived(id, false).await?;
        info!(conversation = %id, "conversation unarchived");
        Ok(())
    }

    fn attach(&self, owner: &IdentityId, feed: Feed, epoch: u64) -> FeedHandle {
        let archived = matches!(feed, Feed::Archived);
        let view = Arc::clone(&self.view);
        let subscription = self.store.watch_conversations(owner, archived);
        FeedHandle::forward(subscription, move |snapshot| {
            view.send_if_modified(|v| {
                if v.epoch != epoch {
                    return false;
                }
                let conversations = match snapshot {
                    Ok(conversations) => conversations,
                    Err(err) => {
                        warn!(error = %err, archived, "chat list feed failed");
                        v.error = Some(err.user_message());
                        return true;
                    }
                };
                match feed {
                    Feed::Active => {
                        if !v.loaded {
                            v.loaded = true;
                            if let Some(route) = v.guard.observe_chats(conversations.len()) {
                                info!("first login without conversations, opening composer");
                                v.redirect = Some(route);
                            }
                        }
                        v.active = conversations;
                    }
                    Feed::Archived => {
                        v.archived_loaded = true;
                        v.archived = conversations;
                    }
                }
                true
            });
        })
    }
}
