//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::ai::{GeminiClient, ReplyGenerator};
use crate::core::config::AppConfig;
use crate::core::errors::ChatResult;
use crate::store::SqliteDocumentStore;

/// Shared application state.
pub struct AppState {
    /// Generator behind `POST /api/generate`.
    pub generator: Arc<dyn ReplyGenerator>,
    /// Document store opened at startup; `/health` checks it.
    pub store: SqliteDocumentStore,
    /// Loaded configuration.
    pub config: AppConfig,
}

impl AppState {
    /// State backed by the hosted model and the configured database.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the database
    /// cannot be opened.
    pub async fn new(config: AppConfig) -> ChatResult<Arc<Self>> {
        let generator = GeminiClient::new(&config.gemini, config.chat.system_preamble.clone())?;
        let store = SqliteDocumentStore::new(&config.storage).await?;
        Ok(Self::with_parts(Arc::new(generator), store, config))
    }

    /// State around an explicit generator and store.
    #[must_use]
    pub fn with_parts(
        generator: Arc<dyn ReplyGenerator>,
        store: SqliteDocumentStore,
        config: AppConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            generator,
            store,
            config,
        })
    }
}
