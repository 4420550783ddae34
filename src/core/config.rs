//! Configuration for the chat application.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{ChatError, ChatResult};

/// Identity preamble sent ahead of the first turn of a new conversation.
pub const DEFAULT_SYSTEM_PREAMBLE: &str = "You are Pluxie, the helpful and friendly AI assistant of Project UnCorp by ybtheflash. You are powered by Google Gemini. Not all the time but introduce yourself as Pluxie if asked your name, and mention your project and technology if relevant.";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document store settings.
    pub storage: StorageConfig,
    /// Hosted model settings.
    pub gemini: GeminiConfig,
    /// Conversation workflow settings.
    pub chat: ChatConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Build the configuration from `UNCORP_*` and `GOOGLE_API_KEY` variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("UNCORP_SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            config.gemini.api_key = key;
        }
        if let Ok(model) = std::env::var("UNCORP_GEMINI_MODEL") {
            config.gemini.model = model;
        }
        if let Ok(base_url) = std::env::var("UNCORP_GEMINI_BASE_URL") {
            config.gemini.base_url = base_url;
        }
        if let Some(port) = std::env::var("UNCORP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            config.server.port = port;
        }
        if let Ok(dir) = std::env::var("UNCORP_STATIC_DIR") {
            config.server.static_dir = PathBuf::from(dir);
        }
        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.gemini.model.trim().is_empty() {
            return Err(ChatError::InvalidConfig(
                "gemini.model must not be empty".to_string(),
            ));
        }
        if self.gemini.timeout_seconds == 0 {
            return Err(ChatError::InvalidConfig(
                "gemini.timeout_seconds must be > 0".to_string(),
            ));
        }
        Url::parse(&self.gemini.base_url)?;

        if self.chat.max_attachments == 0 {
            return Err(ChatError::InvalidConfig(
                "chat.max_attachments must be > 0".to_string(),
            ));
        }
        if self.chat.title_words == 0 {
            return Err(ChatError::InvalidConfig(
                "chat.title_words must be > 0".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ChatError::InvalidConfig(
                "server.port must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("uncorp.sqlite"),
        }
    }
}

/// Hosted generative model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key; empty means requests will be rejected upstream.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// API base URL.
    pub base_url: String,
    /// Request timeout.
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash-preview-05-20".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// Conversation workflow settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Title given to a conversation before its summary is known.
    pub placeholder_title: String,
    /// Client-side cap on attachments per submission.
    pub max_attachments: usize,
    /// Number of words kept from the summary reply.
    pub title_words: usize,
    /// Preamble injected ahead of a single-turn history.
    pub system_preamble: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            placeholder_title: "...".to_string(),
            max_attachments: 5,
            title_words: 5,
            system_preamble: DEFAULT_SYSTEM_PREAMBLE.to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
    /// Directory holding the built UI shell.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: PathBuf::from("static"),
        }
    }
}
