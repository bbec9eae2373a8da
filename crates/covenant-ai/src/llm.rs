//! Extraction collaborator: an LLM that turns document text into metadata JSON.

use async_trait::async_trait;
use covenant_core::Transient;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM service rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("LLM service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("unexpected LLM response: {0}")]
    Parse(String),

    #[error("model refused: {0}")]
    Refused(String),
}

impl LlmError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

/// A model that extracts contract metadata from a text snippet.
///
/// Implementations return the raw JSON text of the model's answer; decoding
/// and validation happen in the caller.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Model identifier recorded as provenance.
    fn model(&self) -> &str;

    async fn extract(&self, snippet: &str) -> Result<String, LlmError>;
}

#[cfg(feature = "openai")]
mod openai {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tracing::debug;

    use super::*;
    use crate::prompt::{SYSTEM_PROMPT, user_prompt};
    use crate::schema::metadata_schema;

    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

    impl From<reqwest::Error> for LlmError {
        fn from(e: reqwest::Error) -> Self {
            if e.is_decode() {
                Self::Parse(e.to_string())
            } else {
                Self::Transport(e.to_string())
            }
        }
    }

    /// OpenAI-compatible chat completions client using strict structured output.
    pub struct OpenAiExtractor {
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
        temperature: Option<f32>,
        schema: serde_json::Value,
    }

    #[derive(Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: [Message<'a>; 2],
        #[serde(skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        response_format: ResponseFormat<'a>,
    }

    #[derive(Serialize)]
    struct Message<'a> {
        role: &'static str,
        content: &'a str,
    }

    #[derive(Serialize)]
    struct ResponseFormat<'a> {
        #[serde(rename = "type")]
        kind: &'static str,
        json_schema: JsonSchemaFormat<'a>,
    }

    #[derive(Serialize)]
    struct JsonSchemaFormat<'a> {
        name: &'static str,
        strict: bool,
        schema: &'a serde_json::Value,
    }

    #[derive(Deserialize)]
    struct ChatResponse {
        #[serde(default)]
        choices: Vec<Choice>,
    }

    #[derive(Deserialize)]
    struct Choice {
        message: ChoiceMessage,
    }

    #[derive(Deserialize)]
    struct ChoiceMessage {
        content: Option<String>,
        refusal: Option<String>,
    }

    impl OpenAiExtractor {
        pub fn new(api_key: String, model: impl Into<String>) -> Result<Self, LlmError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?;
            Ok(Self {
                client,
                base_url: DEFAULT_BASE_URL.to_string(),
                api_key,
                model: model.into(),
                temperature: Some(0.0),
                schema: metadata_schema(),
            })
        }

        pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
            self.base_url = url.into().trim_end_matches('/').to_string();
            self
        }

        /// `None` leaves the temperature to the service default.
        pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
            self.temperature = temperature;
            self
        }
    }

    #[async_trait]
    impl MetadataExtractor for OpenAiExtractor {
        fn model(&self) -> &str {
            &self.model
        }

        async fn extract(&self, snippet: &str) -> Result<String, LlmError> {
            let user = user_prompt(snippet);
            let request = ChatRequest {
                model: &self.model,
                messages: [
                    Message {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Message {
                        role: "user",
                        content: &user,
                    },
                ],
                temperature: self.temperature,
                response_format: ResponseFormat {
                    kind: "json_schema",
                    json_schema: JsonSchemaFormat {
                        name: "contract_metadata",
                        strict: true,
                        schema: &self.schema,
                    },
                },
            };

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?;

            let status = resp.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(LlmError::Unauthorized {
                    status: status.as_u16(),
                });
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: ChatResponse = resp.json().await?;
            let message = parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message)
                .ok_or_else(|| LlmError::Parse("no choices in response".into()))?;
            if let Some(refusal) = message.refusal {
                return Err(LlmError::Refused(refusal));
            }
            let content = message
                .content
                .ok_or_else(|| LlmError::Parse("empty message content".into()))?;
            debug!(model = %self.model, chars = content.len(), "completion received");
            Ok(content)
        }
    }
}

#[cfg(feature = "openai")]
pub use openai::{DEFAULT_BASE_URL, OpenAiExtractor};
