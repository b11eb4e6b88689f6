use thiserror::Error;

/// Top-level error type for the analyst service.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for AnalystError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalystError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl From<toml::de::Error> for AnalystError {
    fn from(err: toml::de::Error) -> Self {
        AnalystError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AnalystError {
    fn from(err: toml::ser::Error) -> Self {
        AnalystError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AnalystError {
    fn from(err: serde_json::Error) -> Self {
        AnalystError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for analyst operations.
pub type Result<T> = std::result::Result<T, AnalystError>;
