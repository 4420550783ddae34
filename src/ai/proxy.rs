//! `/api/generate` request/response shapes.
//!
//! The server handler calls [`respond`] with a configured generator; remote
//! callers use [`ProxyGenerator`], which speaks the same JSON.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::Url;

use crate::ai::{GenerateFuture, ReplyGenerator};
use crate::core::errors::{ChatError, ChatResult, GENERATION_FAILED_TEXT};
use crate::core::model::{Attachment, Turn};

/// File payload with base64-encoded bytes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFile {
    /// File name.
    pub name: String,
    /// Media type.
    pub mime_type: String,
    /// Base64 content.
    pub data: String,
}

impl InlineFile {
    /// Encode an attachment for the wire.
    #[must_use]
    pub fn from_attachment(attachment: &Attachment) -> Self {
        Self {
            name: attachment.name.clone(),
            mime_type: attachment.media_type.clone(),
            data: STANDARD.encode(&attachment.data),
        }
    }

    /// Decode back into an attachment.
    ///
    /// # Errors
    /// Returns `ChatError::Base64` if `data` is not valid base64.
    pub fn into_attachment(self) -> ChatResult<Attachment> {
        Ok(Attachment {
            data: STANDARD.decode(self.data.as_bytes())?,
            name: self.name,
            media_type: self.mime_type,
        })
    }
}

/// Body of `POST /api/generate`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Ordered history, last entry is the newest user turn.
    pub conversation: Vec<Turn>,
    /// Files for the last user turn.
    #[serde(default)]
    pub files: Vec<InlineFile>,
}

/// Result of `POST /api/generate`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Whether `text` holds a reply.
    pub success: bool,
    /// Reply text on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// User-facing failure text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    /// Successful reply.
    #[must_use]
    pub const fn ok(text: String) -> Self {
        Self {
            success: true,
            text: Some(text),
            error: None,
        }
    }

    /// Failed generation with the generic failure text.
    #[must_use]
    pub fn failed() -> Self {
        Self {
            success: false,
            text: None,
            error: Some(GENERATION_FAILED_TEXT.to_string()),
        }
    }

    /// Collapse the flag back into a result.
    ///
    /// # Errors
    /// Returns `ChatError::Generation` when `success` is false or no text came back.
    pub fn into_result(self) -> ChatResult<String> {
        match (self.success, self.text) {
            (true, Some(text)) if !text.trim().is_empty() => Ok(text),
            _ => Err(ChatError::Generation(
                self.error
                    .unwrap_or_else(|| GENERATION_FAILED_TEXT.to_string()),
            )),
        }
    }
}

/// Serve one generation request.
///
/// Generation failures are logged and reported through the `success` flag.
///
/// # Errors
/// Returns `ChatError::Base64` if a file payload cannot be decoded.
pub async fn respond(
    generator: &dyn ReplyGenerator,
    request: GenerateRequest,
) -> ChatResult<GenerateResponse> {
    let attachments = request
        .files
        .into_iter()
        .map(InlineFile::into_attachment)
        .collect::<ChatResult<Vec<_>>>()?;

    match generator.generate(&request.conversation, &attachments).await {
        Ok(text) => {
            info!(
                turns = request.conversation.len(),
                attachments = attachments.len(),
                "generation succeeded"
            );
            Ok(GenerateResponse::ok(text))
        }
        Err(err) => {
            error!(error = %err, "generation failed");
            Ok(GenerateResponse::failed())
        }
    }
}

/// Generator that forwards to a remote `/api/generate` endpoint.
pub struct ProxyGenerator {
    client: Client,
    endpoint: Url,
}

impl ProxyGenerator {
    /// Build a proxy against `base_url` (e.g. `http://localhost:3000`).
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> ChatResult<Self> {
        let endpoint = Url::parse(base_url)?.join("/api/generate")?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// Target URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn request(&self, turns: &[Turn], attachments: &[Attachment]) -> ChatResult<String> {
        let body = GenerateRequest {
            conversation: turns.to_vec(),
            files: attachments.iter().map(InlineFile::from_attachment).collect(),
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: GenerateResponse = response.json().await?;
        parsed.into_result()
    }
}

impl ReplyGenerator for ProxyGenerator {
    fn generate<'a>(
        &'a self,
        turns: &'a [Turn],
        attachments: &'a [Attachment],
    ) -> GenerateFuture<'a, ChatResult<String>> {
        Box::pin(async move {
            self.request(turns, attachments).await.map_err(|err| match err {
                ChatError::Generation(_) => err,
                other => ChatError::Generation(other.to_string()),
            })
        })
    }
}
