//! Ollama chat client (`/api/chat`).
//!
//! Non-streaming calls return one JSON object; streaming calls return
//! newline-delimited JSON objects, each carrying a `message.content` delta,
//! until one arrives with `done: true`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{parse_http_error, LlmError};
use crate::lines::line_stream;
use crate::provider::{ChatModel, TextStream};
use crate::types::{ChatRequest, GenerationOptions};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const PROVIDER: &str = "Ollama";
const NOT_RUNNING_HINT: &str = "is the Ollama server running? Start it with `ollama serve`";

/// HTTP client for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatBody<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: &'a GenerationOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> OllamaChatBody<'a> {
        OllamaChatBody {
            model: &self.model,
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: match m.role {
                        analyst_core::Role::User => "user",
                        analyst_core::Role::Assistant => "assistant",
                        analyst_core::Role::System => "system",
                    },
                    content: &m.content,
                })
                .collect(),
            stream,
            options: &request.options,
        }
    }

    async fn post_chat(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(url = %url, model = %self.model, stream, messages = request.messages.len(), "Ollama chat request");

        let response = self
            .http
            .post(&url)
            .json(&self.body(request, stream))
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e, NOT_RUNNING_HINT))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body, PROVIDER));
        }
        Ok(response)
    }
}

/// Parse one NDJSON line into its text delta. Empty deltas yield `None`.
fn parse_stream_line(line: &str) -> Option<Result<String, LlmError>> {
    match serde_json::from_str::<OllamaChatResponse>(line) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return Some(Err(LlmError::Http {
                    status: 500,
                    message: error,
                }));
            }
            let content = chunk.message.map(|m| m.content).unwrap_or_default();
            if content.is_empty() {
                None
            } else {
                Some(Ok(content))
            }
        }
        Err(e) => Some(Err(LlmError::Decode(format!(
            "invalid Ollama stream line: {}",
            e
        )))),
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self.post_chat(request, false).await?;
        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(LlmError::Http {
                status: 500,
                message: error,
            });
        }
        debug!(done = parsed.done, "Ollama chat response");
        match parsed.message {
            Some(message) if !message.content.trim().is_empty() => Ok(message.content),
            _ => Err(LlmError::EmptyResponse),
        }
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let response = self.post_chat(request, true).await?;
        let stream = line_stream(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e, NOT_RUNNING_HINT))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status.as_u16(), &body, PROVIDER))
        }
    }
}
