//! Live queries as channels.
//!
//! A [`Subscription`] re-runs its query whenever the store announces a change
//! in its scope and delivers the full, ordered result set. Dropping the
//! subscription (or calling [`Subscription::close`]) stops the background
//! task, so every open is paired with a close on scope exit.

use std::future::Future;

use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::errors::ChatResult;
use crate::core::ids::{ConversationId, IdentityId};

/// Snapshots buffered per subscription before the query task waits.
const SNAPSHOT_BUFFER: usize = 8;

/// Scope touched by a committed write.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChangeEvent {
    /// A profile record changed.
    Identity(IdentityId),
    /// A conversation owned by `owner` was created, changed or deleted.
    Conversation {
        /// Owner of the conversation.
        owner: IdentityId,
    },
    /// The messages of a conversation changed.
    Messages(ConversationId),
}

/// Standing query delivering a fresh snapshot after every relevant change.
pub struct Subscription<T> {
    rx: mpsc::Receiver<ChatResult<Vec<T>>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Start a live query.
    ///
    /// `changes` must be subscribed before the call so that no write between
    /// the initial fetch and the first `recv` is missed.
    pub(crate) fn spawn<M, F, Fut>(
        mut changes: broadcast::Receiver<ChangeEvent>,
        matches: M,
        fetch: F,
    ) -> Self
    where
        M: Fn(&ChangeEvent) -> bool + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ChatResult<Vec<T>>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let task = tokio::spawn(async move {
            if tx.send(fetch().await).await.is_err() {
                return;
            }
            loop {
                let refresh = match changes.recv().await {
                    Ok(event) => matches(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "live query lagged behind the change feed");
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if refresh && tx.send(fetch().await).await.is_err() {
                    break;
                }
            }
        });
        Self { rx, task }
    }
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot. `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<ChatResult<Vec<T>>> {
        self.rx.recv().await
    }

    /// Stop the live query.
    pub fn close(mut self) {
        self.rx.close();
        self.task.abort();
    }
}

impl<T: Send + 'static> Subscription<T> {
    /// Adapt into a `Stream` of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = ChatResult<Vec<T>>> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|snapshot| (snapshot, sub))
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Background task draining a [`Subscription`] into a callback.
///
/// Dropping the handle aborts the task, which drops and closes the subscription.
pub struct FeedHandle {
    task: JoinHandle<()>,
}

impl FeedHandle {
    /// Forward every snapshot of `subscription` to `sink`.
    pub fn forward<T, S>(mut subscription: Subscription<T>, mut sink: S) -> Self
    where
        T: Send + 'static,
        S: FnMut(ChatResult<Vec<T>>) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                sink(snapshot);
            }
        });
        Self { task }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
