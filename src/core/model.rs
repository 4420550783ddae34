//! Documents and value types shared by the store, the AI requester and the
//! session controllers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ids::{ConversationId, IdentityId, MessageId};

/// Which party authored a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The signed-in human.
    User,
    /// The generative model.
    Model,
}

impl Role {
    /// Stable string form for storage and the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            _ => Err(value.to_string()),
        }
    }
}

/// Cosmetic palette key stored on the profile and mirrored in a cookie.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// Default palette.
    #[default]
    Lilac,
    /// Blue.
    Blue,
    /// Light blue.
    #[serde(rename = "lightblue")]
    LightBlue,
    /// Dark slate.
    Dark,
    /// Pure black, falls back to blue in the light theme.
    Amoled,
}

impl ColorScheme {
    /// All schemes in display order.
    pub const ALL: [Self; 5] = [
        Self::Lilac,
        Self::Blue,
        Self::LightBlue,
        Self::Dark,
        Self::Amoled,
    ];

    /// Key used in cookies and profile documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lilac => "lilac",
            Self::Blue => "blue",
            Self::LightBlue => "lightblue",
            Self::Dark => "dark",
            Self::Amoled => "amoled",
        }
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == value)
            .ok_or_else(|| value.to_string())
    }
}

/// Light or dark theme. Managed outside this crate; only read for defaults.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme.
    #[default]
    Light,
    /// Dark theme.
    Dark,
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(value.to_string()),
        }
    }
}

/// Preference fields stored on the profile.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Chosen color scheme, if the user ever picked one.
    pub color_scheme: Option<ColorScheme>,
}

impl Preferences {
    /// Overlay the fields set in `update`, keeping the others.
    pub fn merge(&mut self, update: &Self) {
        if let Some(scheme) = update.color_scheme {
            self.color_scheme = Some(scheme);
        }
    }
}

/// Identity as returned by the identity provider.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Stable unique id.
    pub id: IdentityId,
    /// Display name.
    pub display_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
}

/// Profile record kept in the `identities` collection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique id.
    pub id: IdentityId,
    /// Display name.
    pub display_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// When the profile was first created.
    pub created_at: DateTime<Utc>,
    /// Cosmetic preferences.
    pub preferences: Preferences,
}

impl Identity {
    /// Build a fresh profile for a first sign-in.
    #[must_use]
    pub fn from_provider(identity: &ProviderIdentity, created_at: DateTime<Utc>) -> Self {
        Self {
            id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
            avatar_url: identity.avatar_url.clone(),
            created_at,
            preferences: Preferences::default(),
        }
    }
}

/// Conversation document.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique id.
    pub id: ConversationId,
    /// Owning identity.
    pub owner: IdentityId,
    /// Placeholder until the summary lands.
    pub title: String,
    /// Creation time; list ordering key.
    pub created_at: DateTime<Utc>,
    /// Excluded from the default listing when set.
    pub archived: bool,
}

impl Conversation {
    /// New unarchived conversation owned by `owner`.
    #[must_use]
    pub fn new(owner: IdentityId, title: impl Into<String>) -> Self {
        Self {
            id: ConversationId::new(),
            owner,
            title: title.into(),
            created_at: Utc::now(),
            archived: false,
        }
    }

    /// Whether `identity` owns this conversation.
    #[must_use]
    pub fn is_owned_by(&self, identity: &IdentityId) -> bool {
        &self.owner == identity
    }
}

/// Attachment metadata persisted with a message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// File name.
    pub name: String,
    /// Media type, e.g. `image/png`.
    pub media_type: String,
}

/// A file attached to a submission. Only the metadata is persisted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attachment {
    /// File name.
    pub name: String,
    /// Media type.
    pub media_type: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Metadata kept on the message document.
    #[must_use]
    pub fn meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            name: self.name.clone(),
            media_type: self.media_type.clone(),
        }
    }
}

/// Message inside a conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client-generated id.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// Ordering key.
    pub created_at: DateTime<Utc>,
    /// Attachment metadata, possibly empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentMeta>,
}

impl Message {
    /// Message from the human party.
    #[must_use]
    pub fn user(content: impl Into<String>, attachments: Vec<AttachmentMeta>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            attachments,
        }
    }

    /// Message from the model.
    #[must_use]
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Model,
            content: content.into(),
            created_at: Utc::now(),
            attachments: Vec::new(),
        }
    }

    /// The `{role, text}` pair sent to the model.
    #[must_use]
    pub fn turn(&self) -> Turn {
        Turn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// One entry of the history sent to the model.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Author.
    pub role: Role,
    /// Text content.
    #[serde(rename = "text")]
    pub content: String,
}

impl Turn {
    /// Turn from the human party.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Turn from the model.
    #[must_use]
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_scheme_keys() {
        for scheme in ColorScheme::ALL {
            assert_eq!(scheme.as_str().parse::<ColorScheme>(), Ok(scheme));
        }
        assert_eq!(
            serde_json::to_string(&ColorScheme::LightBlue).unwrap(),
            "\"lightblue\""
        );
        assert!("purple".parse::<ColorScheme>().is_err());
    }

    #[test]
    fn test_message_without_attachments_omits_field() {
        let message = Message::model("hi");
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("attachments").is_none());
        assert_eq!(json["role"], "model");
    }
}
