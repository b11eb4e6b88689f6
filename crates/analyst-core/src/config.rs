use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AnalystError, Result};

/// Top-level configuration for the analyst service.
///
/// Loaded from `~/.analyst/config.toml` by default. Each section corresponds
/// to one crate of the workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalystConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub brd: BrdConfig,
}

impl AnalystConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalystConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AnalystError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `OLLAMA_API_URL`, `OLLAMA_MODEL` and `LLM_PROVIDER` from the
    /// process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_API_URL").filter(|v| !v.is_empty()) {
            self.llm.ollama_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL").filter(|v| !v.is_empty()) {
            self.llm.ollama_model = model;
        }
        if let Some(provider) = lookup("LLM_PROVIDER").filter(|v| !v.is_empty()) {
            self.llm.provider = provider.to_lowercase();
        }
    }

    /// Validate values that would otherwise fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        match self.llm.provider.as_str() {
            "ollama" | "gemini" => {}
            other => {
                return Err(AnalystError::Config(format!(
                    "unknown llm provider '{}' (expected 'ollama' or 'gemini')",
                    other
                )))
            }
        }
        if self.retrieval.chunk_size == 0 {
            return Err(AnalystError::Config("retrieval.chunk_size must be > 0".into()));
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(AnalystError::Config(
                "retrieval.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        if self.chat.max_turns == 0 {
            return Err(AnalystError::Config("chat.max_turns must be > 0".into()));
        }
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.analyst/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![],
            body_limit_bytes: 1024 * 1024,
        }
    }
}

/// Language model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "ollama" or "gemini".
    pub provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    /// Name of the environment variable holding the Gemini API key.
    pub gemini_api_key_env: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "mistral:instruct".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Conversation controller settings.
///
/// The keyword lists drive mode detection and history filtering; they are
/// plain data so deployments can tune them without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// User/assistant pairs of history shown to the model.
    pub max_turns: usize,
    /// Messages retained per session in storage.
    pub history_limit: usize,
    pub max_message_chars: usize,
    /// Delay between emitted characters of a gathering-mode question.
    pub emit_delay_ms: u64,
    pub fallback_question: String,
    pub generate_triggers: Vec<String>,
    pub ba_keywords: Vec<String>,
    pub off_topic_keywords: Vec<String>,
    pub reset_commands: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            max_turns: 8,
            history_limit: 30,
            max_message_chars: 4000,
            emit_delay_ms: 10,
            fallback_question: "Could you tell me more about that?".to_string(),
            generate_triggers: list(&[
                "generate requirements",
                "generate brd",
                "create brd",
                "create documentation",
                "make the document",
                "generate document",
                "i'm done",
                "create requirements",
            ]),
            ba_keywords: list(&[
                "business analyst",
                "requirement",
                "functional",
                "nfr",
                "brd",
                "use case",
                "user story",
                "acceptance criteria",
                "project",
                "stakeholder",
                "feature",
                "budget",
                "timeline",
                "deadline",
                "scope",
                "business idea",
                "target market",
                "customers",
            ]),
            off_topic_keywords: list(&[
                "recipe",
                "make tea",
                "how to make",
                "puzzle",
                "riddle",
                "joke",
                "game",
            ]),
            reset_commands: list(&["reset", "start over", "/reset", "new session"]),
        }
    }
}

/// Retrieval (RAG) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    /// Directory of `.txt` reference documents.
    pub knowledge_dir: String,
    /// "ollama", "gemini" or "hash" (deterministic, offline).
    pub embedding_provider: String,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Snippets shorter than this are discarded.
    pub min_snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            knowledge_dir: "~/.analyst/knowledge".to_string(),
            embedding_provider: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            min_snippet_chars: 50,
        }
    }
}

/// BRD generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrdConfig {
    /// Question/answer pairs carried into the BRD prompt.
    pub max_qa_pairs: usize,
    pub words_per_chunk: usize,
    pub emit_delay_ms: u64,
}

impl Default for BrdConfig {
    fn default() -> Self {
        Self {
            max_qa_pairs: 10,
            words_per_chunk: 8,
            emit_delay_ms: 5,
        }
    }
}
