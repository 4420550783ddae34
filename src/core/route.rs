//! Application addresses.

use std::fmt;

use crate::core::ids::ConversationId;

/// Prefix of a conversation address.
const CONVERSATION_PREFIX: &str = "/c/";

/// A navigable address in the UI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Route {
    /// `/`: composer and chat list.
    Home,
    /// `/c/{id}`: existing conversation.
    Conversation(ConversationId),
    /// Anything else, rendered as not found.
    NotFound(String),
}

impl Route {
    /// Parse a request path.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Self::Home;
        }
        trimmed
            .strip_prefix(CONVERSATION_PREFIX)
            .and_then(|id| id.parse().ok())
            .map_or_else(|| Self::NotFound(path.to_string()), Self::Conversation)
    }

    /// Whether the intro animation may play on this page.
    #[must_use]
    pub const fn is_chat_page(&self) -> bool {
        matches!(self, Self::Home | Self::Conversation(_))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => f.write_str("/"),
            Self::Conversation(id) => write!(f, "{CONVERSATION_PREFIX}{id}"),
            Self::NotFound(path) => f.write_str(path),
        }
    }
}
