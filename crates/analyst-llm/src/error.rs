//! Error types for language model clients.

use analyst_core::error::AnalystError;

/// Errors from a language model provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// The provider cannot be reached (server down, connection refused).
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },
    #[error("{provider} request timed out")]
    Timeout { provider: String },
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether this error means the provider could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::Unavailable { .. })
    }

    /// Map a reqwest failure, recognising connection and timeout errors.
    pub fn from_reqwest(provider: &str, err: reqwest::Error, hint: &str) -> Self {
        if err.is_timeout() {
            LlmError::Timeout {
                provider: provider.to_string(),
            }
        } else if err.is_connect() {
            LlmError::Unavailable {
                provider: provider.to_string(),
                message: format!("{} ({})", hint, err),
            }
        } else if err.is_decode() {
            LlmError::Decode(err.to_string())
        } else {
            LlmError::Transport(err.to_string())
        }
    }
}

/// Map an HTTP error status and body to an [`LlmError`].
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    let message = extract_error_message(body);
    match status {
        401 | 403 => LlmError::Authentication(format!("{}: {}", provider, message)),
        404 => LlmError::ModelNotFound(message),
        429 => LlmError::RateLimited(message),
        _ => LlmError::Http { status, message },
    }
}

/// Pull a human-readable message out of Ollama (`{"error": "..."}`) or
/// Gemini (`{"error": {"message": "..."}}`) error bodies.
fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
            return msg.to_string();
        }
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
    }
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        trimmed.to_string()
    }
}

impl From<LlmError> for AnalystError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Config(msg) => AnalystError::Config(msg),
            other => AnalystError::Llm(other.to_string()),
        }
    }
}
