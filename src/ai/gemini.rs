//! Client for the hosted Gemini `generateContent` endpoint.
//!
//! Behaviour:
//! - Injects the identity preamble when the history has exactly one turn.
//! - Sends attachments as inline base64 parts on the last user turn.
//! - Returns the concatenated text of the first candidate; an empty answer is
//!   a failure.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::prompt::with_preamble;
use crate::ai::{GenerateFuture, ReplyGenerator};
use crate::core::config::GeminiConfig;
use crate::core::errors::{ChatError, ChatResult};
use crate::core::model::{Attachment, Role, Turn};

/// Connect timeout for the hosted API.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

const fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

fn build_contents(turns: &[Turn], attachments: &[Attachment], preamble: &str) -> Vec<Content> {
    let turns = with_preamble(turns, preamble);
    let last = turns.len().saturating_sub(1);
    turns
        .into_iter()
        .enumerate()
        .map(|(idx, turn)| {
            let mut parts = vec![Part::Text { text: turn.content }];
            if idx == last && turn.role == Role::User {
                parts.extend(attachments.iter().map(|file| Part::Inline {
                    inline_data: InlineData {
                        mime_type: file.media_type.clone(),
                        data: STANDARD.encode(&file.data),
                    },
                }));
            }
            Content {
                role: wire_role(turn.role),
                parts,
            }
        })
        .collect()
}

fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    let candidate = response.candidates.first()?;
    let text: String = candidate
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Async client for the hosted model.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    preamble: String,
}

impl GeminiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GeminiConfig, preamble: impl Into<String>) -> ChatResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            preamble: preamble.into(),
        })
    }

    async fn request(&self, turns: &[Turn], attachments: &[Attachment]) -> ChatResult<String> {
        let body = GenerateContentRequest {
            contents: build_contents(turns, attachments, &self.preamble),
        };
        debug!(
            turns = body.contents.len(),
            attachments = attachments.len(),
            "requesting generation"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "generation request rejected");
            return Err(ChatError::Generation(format!("http status {status}")));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        extract_text(&parsed).ok_or_else(|| ChatError::Generation("empty response".to_string()))
    }
}

impl ReplyGenerator for GeminiClient {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_turn_gets_preamble_and_inline_parts() {
        let files = vec![Attachment {
            name: "cat.png".to_string(),
            media_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        }];
        let contents = build_contents(&[Turn::user("Hello")], &files, "You are Pluxie.");
        let json = serde_json::to_value(&contents).unwrap();

        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["parts"][0]["text"], "You are Pluxie.");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[1]["parts"][0]["text"], "Hello");
        assert_eq!(json[1]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json[1]["parts"][1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn test_history_keeps_roles_without_preamble() {
        let turns = [Turn::user("Hi"), Turn::model("Hello!"), Turn::user("Bye")];
        let contents = build_contents(&turns, &[], "You are Pluxie.");
        let roles: Vec<_> = contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_extract_text_joins_parts_and_rejects_empty() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi "},{"text":"there"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&response).as_deref(), Some("Hi there"));

        let empty: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)
                .unwrap();
        assert_eq!(extract_text(&empty), None);
        assert_eq!(extract_text(&GenerateContentResponse::default()), None);
    }
}
