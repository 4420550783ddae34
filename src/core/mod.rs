//! Core types: configuration, errors, identifiers, documents and routes.

pub mod config;
pub mod errors;
pub mod ids;
pub mod model;
pub mod route;

pub use config::{AppConfig, ChatConfig, GeminiConfig, ServerConfig, StorageConfig};
pub use errors::{ChatError, ChatResult};
pub use ids::{ConversationId, IdentityId, MessageId};
pub use model::{
    Attachment, AttachmentMeta, ColorScheme, Conversation, Identity, Message, Preferences,
    ProviderIdentity, Role, Theme, Turn,
};
pub use route::Route;
