//! Error types for the conversation engine.

use analyst_core::error::AnalystError;
use analyst_core::types::ConversationMode;
use analyst_llm::LlmError;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("no BRD has been generated for this session")]
    BrdNotGenerated,
    #[error("language model service unavailable")]
    ServiceUnavailable,
    #[error("invalid mode transition: {0} -> {1}")]
    InvalidTransition(ConversationMode, ConversationMode),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<AnalystError> for ChatError {
    fn from(err: AnalystError) -> Self {
        match err {
            AnalystError::SessionNotFound(id) => match uuid::Uuid::parse_str(&id) {
                Ok(id) => ChatError::SessionNotFound(id),
                Err(_) => ChatError::Storage(format!("session not found: {}", id)),
            },
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        ChatError::Llm(err.to_string())
    }
}
