//! Startup helpers for the chat server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::errors::ChatResult;
use crate::server::{self, AppState};

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting UnCorp chat v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let state = match rt.block_on(initialize()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(server::run_server_with_shutdown(state, shutdown_signal())) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Load and validate configuration, open the database, then build the
/// application state.
///
/// # Errors
/// Returns an error if the configuration is invalid or state creation fails.
pub async fn initialize() -> ChatResult<Arc<AppState>> {
    let config = AppConfig::from_env();
    config.validate()?;
    if config.gemini.api_key.is_empty() {
        tracing::warn!("GOOGLE_API_KEY is not set; generation requests will fail");
    }
    tracing::info!(
        "Model: {} via {}",
        config.gemini.model,
        config.gemini.base_url
    );
    tracing::info!("Database: {}", config.storage.sqlite_path.display());
    AppState::new(config).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
