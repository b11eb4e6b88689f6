//! Google Gemini client (`generateContent` / `streamGenerateContent`).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use analyst_core::types::Role;

use crate::error::{parse_http_error, LlmError};
use crate::lines::line_stream;
use crate::provider::{ChatModel, TextStream};
use crate::types::ChatRequest;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

const PROVIDER: &str = "Gemini";
/// The API rejects requests with more stop sequences than this.
const MAX_STOP_SEQUENCES: usize = 5;

/// HTTP client for the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect::<String>())
            .unwrap_or_default()
    }
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("Gemini API key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    /// Build a client reading the API key from the named environment variable.
    pub fn from_env(
        base_url: impl Into<String>,
        model: impl Into<String>,
        key_var: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let key = std::env::var(key_var)
            .map_err(|_| LlmError::Config(format!("{} is not set", key_var)))?;
        Self::new(base_url, model, key, timeout)
    }

    fn body(request: &ChatRequest) -> GenerateBody {
        let system_instruction = request.system_text().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        });

        let contents = request
            .conversation()
            .map(|m| Content {
                role: Some(match m.role {
                    Role::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                }),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let opts = &request.options;
        GenerateBody {
            system_instruction,
            contents,
            generation_config: GenerationConfig {
                temperature: opts.temperature,
                max_output_tokens: opts.num_predict,
                top_p: opts.top_p,
                top_k: opts.top_k,
                stop_sequences: opts.stop.iter().take(MAX_STOP_SEQUENCES).cloned().collect(),
            },
        }
    }

    async fn post(&self, method: &str, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:{}",
            self.base_url, self.model, method
        );
        debug!(model = %self.model, method, messages = request.messages.len(), "Gemini request");

        let mut builder = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::body(request));
        if method == "streamGenerateContent" {
            builder = builder.query(&[("alt", "sse")]);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e, "cannot reach the Gemini API"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_http_error(status.as_u16(), &body, PROVIDER));
        }
        Ok(response)
    }
}

/// Parse one SSE line. Only `data:` lines carry payloads.
fn parse_sse_line(line: &str) -> Option<Result<String, LlmError>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<GenerateResponse>(payload) {
        Ok(chunk) => {
            let text = chunk.text();
            if text.is_empty() {
                None
            } else {
                Some(Ok(text))
            }
        }
        Err(e) => Some(Err(LlmError::Decode(format!(
            "invalid Gemini stream event: {}",
            e
        )))),
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self.post("generateContent", request).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let response = self.post("streamGenerateContent", request).await?;
        let stream = line_stream(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model);
        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(PROVIDER, e, "cannot reach the Gemini API"))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(parse_http_error(status.as_u16(), &body, PROVIDER))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationOptions;
    use analyst_core::types::Message;
    use axum::extract::Path;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request() -> ChatRequest {
        ChatRequest::new(
            vec![
                Message::system("You are a BA"),
                Message::user("bakery"),
                Message::assistant("Who buys?"),
                Message::user("locals"),
            ],
            GenerationOptions::default()
                .temperature(0.2)
                .num_predict(4000)
                .stop(["a", "b", "c", "d", "e", "f", "g"]),
        )
    }

    #[test]
    fn test_body_mapping() {
        let body = serde_json::to_value(GeminiClient::body(&request())).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a BA");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4000);
        assert_eq!(
            body["generationConfig"]["stopSequences"].as_array().unwrap().len(),
            MAX_STOP_SEQUENCES
        );
        assert!(body["generationConfig"].get("topK").is_none());
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = GeminiClient::new(DEFAULT_GEMINI_URL, "gemini-2.5-flash", " ", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn test_debug_hides_key() {
        let client =
            GeminiClient::new(DEFAULT_GEMINI_URL, "m", "secret-key", Duration::from_secs(1)).unwrap();
        assert!(!format!("{:?}", client).contains("secret-key"));
    }

    #[tokio::test]
    async fn test_chat_parses_candidate_text() {
        let router = Router::new().route(
            "/v1beta/models/{call}",
            post(|Path(call): Path<String>, headers: HeaderMap, Json(_body): Json<Value>| async move {
                assert_eq!(call, "gemini-2.5-flash:generateContent");
                assert_eq!(headers["x-goog-api-key"], "k");
                Json(json!({
                    "candidates": [{"content": {"role": "model", "parts": [{"text": "What is "}, {"text": "your budget?"}]}}]
                }))
            }),
        );
        let url = spawn_server(router).await;
        let client = GeminiClient::new(url, "gemini-2.5-flash", "k", Duration::from_secs(5)).unwrap();
        assert_eq!(client.chat(&request()).await.unwrap(), "What is your budget?");
    }

    #[tokio::test]
    async fn test_chat_stream_parses_sse() {
        let events = [
            json!({"candidates": [{"content": {"parts": [{"text": "## 1. Executive"}]}}]}),
            json!({"candidates": [{"content": {"parts": [{"text": " Summary"}]}}]}),
        ]
        .iter()
        .map(|v| format!("data: {}\r\n\r\n", v))
        .collect::<String>();

        let router = Router::new().route("/v1beta/models/{call}", post(move || async move { events }));
        let url = spawn_server(router).await;
        let client = GeminiClient::new(url, "m", "k", Duration::from_secs(5)).unwrap();

        let chunks: Vec<String> = client
            .chat_stream(&request())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), "## 1. Executive Summary");
    }

    #[tokio::test]
    async fn test_invalid_key_maps_error_message() {
        let router = Router::new().route(
            "/v1beta/models/{call}",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#,
                )
            }),
        );
        let url = spawn_server(router).await;
        let client = GeminiClient::new(url, "m", "bad", Duration::from_secs(5)).unwrap();
        let err = client.chat(&request()).await.unwrap_err();
        assert_eq!(
            err,
            LlmError::Http {
                status: 400,
                message: "API key not valid".into()
            }
        );
    }

    #[test]
    fn test_parse_sse_line() {
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("data: [DONE]").is_none());
        assert!(matches!(
            parse_sse_line("data: {oops"),
            Some(Err(LlmError::Decode(_)))
        ));
    }
}
