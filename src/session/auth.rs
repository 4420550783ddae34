//! Auth session holder.
//!
//! Wraps an [`IdentityProvider`] and publishes the signed-in identity through
//! a `watch` channel. The first sign-in of an identity creates its profile
//! record; later sign-ins leave it untouched.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::errors::{ChatError, ChatResult};
use crate::core::model::{Identity, ProviderIdentity};
use crate::session::SessionFuture;
use crate::session::controller::Confirmer;
use crate::store::{DocumentStore, WriteBatch};

/// Prompt shown before the account and all its data are deleted.
pub const DELETE_ACCOUNT_PROMPT: &str = "Are you absolutely sure? This cannot be undone.";

/// Federated identity provider.
pub trait IdentityProvider: Send + Sync {
    /// Identity remembered from a previous visit, if any.
    fn restore(&self) -> SessionFuture<'_, ChatResult<Option<ProviderIdentity>>>;

    /// Run the popup sign-in flow.
    ///
    /// Returns `ChatError::SignInCancelled` when the user closes the popup.
    fn sign_in_popup(&self) -> SessionFuture<'_, ChatResult<ProviderIdentity>>;

    /// End the provider session.
    fn sign_out(&self) -> SessionFuture<'_, ChatResult<()>>;

    /// Delete the signed-in provider account.
    ///
    /// Returns `ChatError::StaleCredentials` when the provider wants a recent sign-in.
    fn delete_current(&self) -> SessionFuture<'_, ChatResult<()>>;
}

/// Published auth state.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthState {
    /// Signed-in identity.
    pub identity: Option<ProviderIdentity>,
    /// True until the initial resolution finished.
    pub loading: bool,
}

/// Holder of the current identity.
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    confirmer: Arc<dyn Confirmer>,
    state: watch::Sender<AuthState>,
}

impl AuthSession {
    /// New session in the loading state.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            provider,
            store,
            confirmer,
            state: watch::Sender::new(AuthState {
                identity: None,
                loading: true,
            }),
        }
    }

    /// Receiver notified on every identity change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Signed-in identity, if any.
    #[must_use]
    pub fn current(&self) -> Option<ProviderIdentity> {
        self.state.borrow().identity.clone()
    }

    /// Whether the initial resolution is still running.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Resolve the remembered identity and leave the loading state.
    ///
    /// # Errors
    /// Returns an error if the provider or the profile write fails; the
    /// session is then signed out but no longer loading.
    pub async fn initialize(&self) -> ChatResult<()> {
        let restored = match self.provider.restore().await {
            Ok(restored) => restored,
            Err(err) => {
                self.publish(None);
                return Err(err);
            }
        };
        if let Some(identity) = &restored {
            if let Err(err) = self.ensure_profile(identity).await {
                self.publish(None);
                return Err(err);
            }
        }
        self.publish(restored);
        Ok(())
    }

    /// Run the popup flow. A cancelled popup yields `Ok(None)`.
    ///
    /// # Errors
    /// Returns provider or storage failures other than cancellation.
    pub async fn sign_in(&self) -> ChatResult<Option<ProviderIdentity>> {
        let identity = match self.provider.sign_in_popup().await {
            Ok(identity) => identity,
            Err(ChatError::SignInCancelled) => {
                info!("sign-in popup closed by the user");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.ensure_profile(&identity).await?;
        info!(identity = %identity.id, "signed in");
        self.publish(Some(identity.clone()));
        Ok(Some(identity))
    }

    /// Clear the session.
    ///
    /// # Errors
    /// Returns an error if the provider fails; the session stays signed in then.
    pub async fn sign_out(&self) -> ChatResult<()> {
        self.provider.sign_out().await?;
        info!("signed out");
        self.publish(None);
        Ok(())
    }

    /// After confirmation, delete every owned conversation, their messages and
    /// the profile in one batch, then the provider account. Returns whether
    /// anything was deleted.
    ///
    /// # Errors
    /// Returns `NotSignedIn` without an identity and `StaleCredentials` when
    /// the provider wants a fresh sign-in first.
    pub async fn delete_account(&self) -> ChatResult<bool> {
        let identity = self.current().ok_or(ChatError::NotSignedIn)?;
        if !self.confirmer.confirm(DELETE_ACCOUNT_PROMPT).await {
            info!(identity = %identity.id, "account deletion declined");
            return Ok(false);
        }

        let mut batch = WriteBatch::new();
        for conversation in self.store.list_conversations(&identity.id, None).await? {
            for message in self.store.list_messages(conversation.id).await? {
                batch.delete_message(conversation.id, message.id);
            }
            batch.delete_conversation(conversation.id);
        }
        batch.delete_identity(identity.id.clone());
        let ops = batch.len();
        self.store.commit(batch).await?;
        info!(identity = %identity.id, ops, "account data deleted");

        if let Err(err) = self.provider.delete_current().await {
            warn!(identity = %identity.id, error = %err, "provider account deletion failed");
            return Err(err);
        }
        self.publish(None);
        Ok(true)
    }

    /// Create the profile on first sign-in. Returns whether it was created.
    async fn ensure_profile(&self, identity: &ProviderIdentity) -> ChatResult<bool> {
        if self.store.get_identity(&identity.id).await?.is_some() {
            return Ok(false);
        }
        self.store
            .create_identity(&Identity::from_provider(identity, Utc::now()))
            .await?;
        info!(identity = %identity.id, "profile created");
        Ok(true)
    }

    fn publish(&self, identity: Option<ProviderIdentity>) {
        self.state.send_replace(AuthState {
            identity,
            loading: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::STALE_CREDENTIALS_TEXT;
    use crate::core::model::{Conversation, Message};
    use crate::store::{ConversationStore, IdentityStore, MessageStore, SqliteDocumentStore};
    use crate::testing::{FakeIdentityProvider, FixedConfirm, identity};

    async fn session_with(
        provider: Arc<FakeIdentityProvider>,
        confirm: bool,
    ) -> (AuthSession, Arc<SqliteDocumentStore>) {
        let store = Arc::new(SqliteDocumentStore::open_in_memory().await.unwrap());
        let auth = AuthSession::new(provider, store.clone(), Arc::new(FixedConfirm(confirm)));
        (auth, store)
    }

    async fn session(provider: Arc<FakeIdentityProvider>) -> (AuthSession, Arc<SqliteDocumentStore>) {
        session_with(provider, true).await
    }

    #[tokio::test]
    async fn test_initialize_leaves_loading_state() {
        let (auth, _store) = session(Arc::new(FakeIdentityProvider::new(identity("U1")))).await;
        assert!(auth.is_loading());
        auth.initialize().await.unwrap();
        assert!(!auth.is_loading());
        assert_eq!(auth.current(), None);
    }

    #[tokio::test]
    async fn test_initialize_restores_remembered_identity() {
        let (auth, store) = session(Arc::new(FakeIdentityProvider::remembering(identity("U1")))).await;
        let mut rx = auth.subscribe();
        auth.initialize().await.unwrap();

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert!(!state.loading);
        assert_eq!(state.identity, Some(identity("U1")));
        assert!(store.get_identity(&identity("U1").id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_first_sign_in_creates_profile_once() {
        let provider = Arc::new(FakeIdentityProvider::new(identity("U1")));
        let (auth, store) = session(provider.clone()).await;
        auth.initialize().await.unwrap();

        let signed_in = auth.sign_in().await.unwrap().unwrap();
        let profile = store.get_identity(&signed_in.id).await.unwrap().unwrap();

        auth.sign_out().await.unwrap();
        assert_eq!(auth.current(), None);
        auth.sign_in().await.unwrap();
        let again = store.get_identity(&signed_in.id).await.unwrap().unwrap();
        assert_eq!(profile.created_at, again.created_at);
    }

    #[tokio::test]
    async fn test_cancelled_popup_is_not_an_error() {
        let provider = Arc::new(FakeIdentityProvider::new(identity("U1")));
        provider.cancel_next_sign_in();
        let (auth, _store) = session(provider).await;
        auth.initialize().await.unwrap();

        assert_eq!(auth.sign_in().await.unwrap(), None);
        assert_eq!(auth.current(), None);
    }

    #[tokio::test]
    async fn test_delete_account_cascades() {
        let provider = Arc::new(FakeIdentityProvider::new(identity("U1")));
        let (auth, store) = session(provider.clone()).await;
        let me = auth.sign_in().await.unwrap().unwrap();

        let mut archived = Conversation::new(me.id.clone(), "old");
        archived.archived = true;
        let active = Conversation::new(me.id.clone(), "new");
        let other = Conversation::new(identity("U2").id, "theirs");
        for conversation in [&archived, &active, &other] {
            store.create_conversation(conversation).await.unwrap();
            store
                .append_message(conversation.id, &Message::user("hi", Vec::new()))
                .await
                .unwrap();
        }

        assert!(auth.delete_account().await.unwrap());

        assert!(store.get_identity(&me.id).await.unwrap().is_none());
        assert!(store.get_conversation(archived.id).await.unwrap().is_none());
        assert!(store.get_conversation(active.id).await.unwrap().is_none());
        assert!(store.list_messages(active.id).await.unwrap().is_empty());
        assert!(store.get_conversation(other.id).await.unwrap().is_some());
        assert!(provider.was_deleted());
        assert_eq!(auth.current(), None);
    }

    #[tokio::test]
    async fn test_stale_credentials_surface_actionable_text() {
        let provider = Arc::new(FakeIdentityProvider::new(identity("U1")));
        provider.require_recent_login();
        let (auth, _store) = session(provider).await;
        auth.sign_in().await.unwrap();

        let err = auth.delete_account().await.unwrap_err();
        assert!(matches!(err, ChatError::StaleCredentials));
        assert_eq!(err.user_message(), STALE_CREDENTIALS_TEXT);
        assert!(auth.current().is_some());
    }

    #[tokio::test]
    async fn test_declined_account_deletion_keeps_everything() {
        let provider = Arc::new(FakeIdentityProvider::new(identity("U1")));
        let (auth, store) = session_with(provider.clone(), false).await;
        let me = auth.sign_in().await.unwrap().unwrap();
        let conversation = Conversation::new(me.id.clone(), "kept");
        store.create_conversation(&conversation).await.unwrap();

        assert!(!auth.delete_account().await.unwrap());

        assert!(store.get_identity(&me.id).await.unwrap().is_some());
        assert!(store.get_conversation(conversation.id).await.unwrap().is_some());
        assert!(!provider.was_deleted());
        assert_eq!(auth.current(), Some(me));
    }

    #[tokio::test]
    async fn test_delete_account_requires_identity() {
        let (auth, _store) = session(Arc::new(FakeIdentityProvider::new(identity("U1")))).await;
        assert!(matches!(
            auth.delete_account().await,
            Err(ChatError::NotSignedIn)
        ));
    }
}
