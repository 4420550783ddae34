//! Generative-model access.
//!
//! - `prompt`: preamble injection and title summarisation
//! - `gemini`: hosted API client
//! - `proxy`: the `/api/generate` request/response shapes, the server-side
//!   requester and a client that calls it

pub mod gemini;
pub mod prompt;
pub mod proxy;

use std::future::Future;
use std::pin::Pin;

use crate::core::errors::ChatResult;
use crate::core::model::{Attachment, Turn};

pub use gemini::GeminiClient;
pub use proxy::{GenerateRequest, GenerateResponse, InlineFile, ProxyGenerator, respond};

/// Boxed future type for generation calls.
pub type GenerateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the model's next reply for an ordered history.
///
/// One request, one reply: no retry and no streaming.
pub trait ReplyGenerator: Send + Sync {
    /// Generate a reply. `attachments` belong to the last user turn.
    ///
    /// # Errors
    /// Returns `ChatError::Generation` if the call fails or yields no text.
    fn generate<'a>(
        &'a self,
        turns: &'a [Turn],
        attachments: &'a [Attachment],
    ) -> GenerateFuture<'a, ChatResult<String>>;
}
