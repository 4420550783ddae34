//! HTTP server for the chat application.
//!
//! Provides:
//! - A health check that also reaches the document store
//! - The generation proxy (`POST /api/generate`)
//! - Cookie-derived display preferences
//! - The static UI shell for `/` and `/c/{id}`

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::errors::ChatResult;

/// Start the HTTP server and stop accepting connections once `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the listener cannot be bound.
pub async fn run_server_with_shutdown<F>(state: Arc<AppState>, shutdown_signal: F) -> ChatResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
    let app: Router = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("UnCorp chat server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
