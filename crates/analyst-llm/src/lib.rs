//! Language model clients for the business analyst assistant.
//!
//! Two providers are supported: a local Ollama server and the Google
//! Gemini API. Both implement [`ChatModel`] so the chat pipeline never
//! knows which one is configured.

pub mod error;
pub mod gemini;
pub mod lines;
pub mod mock;
pub mod ollama;
pub mod provider;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use analyst_core::config::LlmConfig;

pub use error::{parse_http_error, LlmError};
pub use gemini::GeminiClient;
pub use mock::{ScriptedModel, ScriptedReply};
pub use ollama::OllamaClient;
pub use provider::{ChatModel, TextStream};
pub use types::{ChatRequest, GenerationOptions};

/// Build the configured chat model.
///
/// `provider` is matched case-insensitively. Gemini reads its API key from
/// the environment variable named by `gemini_api_key_env`.
pub fn build_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>, LlmError> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    match config.provider.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(
            &config.ollama_url,
            &config.ollama_model,
            timeout,
        )?)),
        "gemini" => Ok(Arc::new(GeminiClient::from_env(
            &config.gemini_base_url,
            &config.gemini_model,
            &config.gemini_api_key_env,
            timeout,
        )?)),
        other => Err(LlmError::Config(format!(
            "unknown LLM provider '{}' (expected 'ollama' or 'gemini')",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ollama() {
        let config = LlmConfig::default();
        let model = build_chat_model(&config).unwrap();
        assert_eq!(model.name(), "ollama");
        assert_eq!(model.model(), config.ollama_model);
    }

    #[test]
    fn test_build_gemini_without_key_fails() {
        let config = LlmConfig {
            provider: "Gemini".into(),
            gemini_api_key_env: "ANALYST_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LlmConfig::default()
        };
        let err = build_chat_model(&config).err().unwrap();
        assert!(matches!(err, LlmError::Config(m) if m.contains("ANALYST_TEST_KEY_THAT_IS_NEVER_SET")));
    }

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "openai".into(),
            ..LlmConfig::default()
        };
        assert!(build_chat_model(&config).is_err());
    }
}
