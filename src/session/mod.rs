//! Client-side session state.
//!
//! Each holder publishes its state through a `tokio::sync::watch` channel and
//! receives its collaborators (store, generator, identity provider,
//! confirmation prompt, cookie jar) explicitly at construction.

pub mod auth;
pub mod buckets;
pub mod chat_list;
pub mod controller;
pub mod cookies;
pub mod preferences;
pub mod redirect;

use std::future::Future;
use std::pin::Pin;

pub use auth::{AuthSession, AuthState, IdentityProvider};
pub use buckets::{Bucket, Buckets};
pub use chat_list::{ChatList, ChatListView};
pub use controller::{Confirmer, ConversationController, ConversationView, Phase};
pub use cookies::{CookieJar, IntroOverlay, MemoryCookieJar};
pub use preferences::{CookiePreferences, PreferenceStore};
pub use redirect::FirstLoginRedirect;

/// Boxed future returned by the session collaborators.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
