use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person describing their business idea.
    User,
    /// The analyst (model) side of the conversation.
    Assistant,
    /// Instruction text. Only ever built fresh per turn, never replayed.
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Conversational intent of a session.
///
/// Persisted on the session row and advanced once per turn by the mode
/// state machine in `analyst-chat`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// Small talk or anything outside business analysis.
    #[default]
    General,
    /// Discovery: the analyst asks one clarifying question per turn.
    Gathering,
    /// The user asked for a requirements document.
    Generating,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::General => "general",
            ConversationMode::Gathering => "gathering",
            ConversationMode::Generating => "generating",
        }
    }

    /// Whether turns in this mode pull reference snippets from the retriever.
    pub fn uses_retrieval(&self) -> bool {
        matches!(
            self,
            ConversationMode::Gathering | ConversationMode::Generating
        )
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConversationMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(ConversationMode::General),
            "gathering" => Ok(ConversationMode::Gathering),
            "generating" => Ok(ConversationMode::Generating),
            _ => Err(format!("Unknown conversation mode: {}", s)),
        }
    }
}

// =============================================================================
// Messages and sessions
// =============================================================================

/// A single chat message as stored in session history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach the current time.
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }
}

/// A persisted requirements-gathering session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    pub mode: ConversationMode,
    pub brd_generated: bool,
    pub brd_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lightweight listing entry for a session (no message bodies).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub mode: ConversationMode,
    pub message_count: usize,
    pub brd_generated: bool,
    pub updated_at: DateTime<Utc>,
}
