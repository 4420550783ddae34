//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::services::{ServeDir, ServeFile};
use tracing::warn;

use crate::ai::{GenerateRequest, GenerateResponse, respond};
use crate::core::errors::ChatError;
use crate::core::route::Route;
use crate::session::cookies::MemoryCookieJar;
use crate::session::preferences::CookiePreferences;

use super::state::AppState;

/// Name of the UI shell inside the static directory.
const SHELL_FILE: &str = "index.html";

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let shell = ServeDir::new(&static_dir).fallback(ServeFile::new(static_dir.join(SHELL_FILE)));
    Router::new()
        .route("/health", get(health_check))
        .route("/api/generate", post(generate))
        .route("/api/preferences", get(preferences))
        .route("/c/{id}", get(conversation_shell))
        .fallback_service(shell)
        .with_state(state)
}

/// Health check endpoint. Answers 503 when the database is unreachable.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (code, status, storage) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok", "ok"),
        Err(e) => {
            warn!(error = %e, "storage health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };
    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "uncorp-chat",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": storage
        })),
    )
}

/// Proxy one generation request to the configured model.
async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, String)> {
    respond(state.generator.as_ref(), request)
        .await
        .map(Json)
        .map_err(|e| match e {
            ChatError::Base64(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        })
}

/// Color scheme and theme resolved from the request cookies.
async fn preferences(headers: HeaderMap) -> Json<CookiePreferences> {
    let jar = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .map_or_else(MemoryCookieJar::new, MemoryCookieJar::from_header);
    Json(CookiePreferences::from_jar(&jar))
}

/// UI shell for an existing conversation address.
async fn conversation_shell(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Html<String>, (StatusCode, String)> {
    let route = Route::parse(&format!("/c/{id}"));
    if !matches!(route, Route::Conversation(_)) {
        return Err((StatusCode::NOT_FOUND, format!("Unknown page: {route}")));
    }
    let path = state.config.server.static_dir.join(SHELL_FILE);
    tokio::fs::read_to_string(&path).await.map(Html).map_err(|e| {
        warn!(path = %path.display(), error = %e, "UI shell missing");
        (StatusCode::NOT_FOUND, "UI shell not found".to_string())
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::errors::GENERATION_FAILED_TEXT;
    use crate::core::ids::ConversationId;
    use crate::store::SqliteDocumentStore;
    use crate::testing::ScriptedGenerator;

    fn static_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("uncorp-static-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SHELL_FILE), "<html>shell</html>").unwrap();
        dir
    }

    async fn app(generator: ScriptedGenerator) -> Router {
        let mut config = AppConfig::default();
        config.server.static_dir = static_dir();
        let store = SqliteDocumentStore::open_in_memory().await.unwrap();
        create_router(AppState::with_parts(Arc::new(generator), store, config))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(ScriptedGenerator::failing())
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage"], "ok");
    }

    #[tokio::test]
    async fn test_generate_success_and_failure_flags() {
        let request = serde_json::json!({
            "conversation": [{"role": "user", "text": "Hello"}],
            "files": [{"name": "a.txt", "mimeType": "text/plain", "data": "aGk="}]
        });

        let response = app(ScriptedGenerator::replying(["Hi!"]))
            .await
            .oneshot(post_json("/api/generate", request.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": true, "text": "Hi!"})
        );

        let response = app(ScriptedGenerator::failing())
            .await
            .oneshot(post_json("/api/generate", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": false, "error": GENERATION_FAILED_TEXT})
        );
    }

    #[tokio::test]
    async fn test_generate_rejects_bad_base64() {
        let request = serde_json::json!({
            "conversation": [{"role": "user", "text": "Hello"}],
            "files": [{"name": "a.bin", "mimeType": "application/octet-stream", "data": "%%%"}]
        });
        let response = app(ScriptedGenerator::replying(["unused"]))
            .await
            .oneshot(post_json("/api/generate", request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_preferences_from_cookies() {
        let response = app(ScriptedGenerator::failing())
            .await
            .oneshot(
                Request::get("/api/preferences")
                    .header(header::COOKIE, "colorScheme=amoled; theme=dark")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"colorScheme": "amoled", "theme": "dark", "effectiveScheme": "amoled"})
        );

        let response = app(ScriptedGenerator::failing())
            .await
            .oneshot(Request::get("/api/preferences").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["colorScheme"], "lilac");
    }

    #[tokio::test]
    async fn test_conversation_shell() {
        let uri = format!("/c/{}", ConversationId::new());
        let response = app(ScriptedGenerator::failing())
            .await
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<html>shell</html>");

        let response = app(ScriptedGenerator::failing())
            .await
            .oneshot(Request::get("/c/not-an-id").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
