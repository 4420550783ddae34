//! Error types for the chat application.

use thiserror::Error;

use crate::core::ids::{ConversationId, IdentityIdError};

/// Shown when a conversation is missing or owned by someone else.
pub const ACCESS_DENIED_TEXT: &str = "Access Denied or Chat Not Found";
/// Shown when the model call fails or returns nothing.
pub const GENERATION_FAILED_TEXT: &str = "Failed to generate response from AI.";
/// Shown when account deletion needs a fresh sign-in.
pub const STALE_CREDENTIALS_TEXT: &str =
    "For security, please log out and log in again, then try deleting your account.";

/// Chat application error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Submission had neither text nor attachments.
    #[error("message must contain text or at least one attachment")]
    EmptyMessage,
    /// More attachments than the client allows.
    #[error("too many attachments: {got} (max {max})")]
    TooManyAttachments {
        /// Maximum accepted.
        max: usize,
        /// Number received.
        got: usize,
    },
    /// Operation needs a signed-in identity.
    #[error("not signed in")]
    NotSignedIn,
    /// A submission or edit is still in flight.
    #[error("a request is already pending")]
    Busy,
    /// Conversation missing or not owned by the caller.
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),
    /// Message index outside the current list.
    #[error("no message at index {0}")]
    InvalidMessageIndex(usize),
    /// Only the human party's messages can be edited.
    #[error("message at index {0} cannot be edited")]
    NotEditable(usize),
    /// No conversation is open.
    #[error("no active conversation")]
    NoActiveConversation,
    /// Model call failed or returned empty text.
    #[error("generation failed: {0}")]
    Generation(String),
    /// The user closed the sign-in popup.
    #[error("sign-in cancelled")]
    SignInCancelled,
    /// Provider refused a sensitive operation until the user signs in again.
    #[error("{}", STALE_CREDENTIALS_TEXT)]
    StaleCredentials,
    /// Invalid identity id.
    #[error("invalid identity id: {0}")]
    InvalidIdentity(#[from] IdentityIdError),
    /// Stored document could not be decoded.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Attachment payload is not valid base64.
    #[error("invalid attachment encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Text shown inline in the view for this failure.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ConversationNotFound(_) => ACCESS_DENIED_TEXT.to_string(),
            Self::Generation(_) => GENERATION_FAILED_TEXT.to_string(),
            Self::StaleCredentials => STALE_CREDENTIALS_TEXT.to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
