//! Mode detection and the per-session mode state machine.
//!
//! Detection classifies a single message; the state machine combines that
//! with the session's persisted mode so a keyword-free answer in the middle
//! of discovery does not drop the conversation back to small talk.
//!
//! Legal transitions:
//! - General -> Gathering | Generating
//! - Gathering -> Generating | General (reset only)
//! - Generating -> Gathering | General (reset only)
//! - Gathering and Generating may repeat; General -> General is trivial.

use tracing::warn;

use analyst_core::config::ChatConfig;
use analyst_core::types::{ConversationMode, Message};

use crate::error::ChatError;

/// History entries considered when looking for BA keywords.
const KEYWORD_WINDOW: usize = 4;

/// Validate that a mode transition is allowed.
///
/// Leaving a BA mode for `General` requires an explicit reset.
pub fn validate_transition(
    from: ConversationMode,
    to: ConversationMode,
    via_reset: bool,
) -> Result<(), ChatError> {
    use ConversationMode::*;

    let valid = matches!(
        (from, to),
        (General, _)
            | (Gathering, Gathering)
            | (Gathering, Generating)
            | (Generating, Generating)
            | (Generating, Gathering)
    ) || (to == General && via_reset);

    if valid {
        Ok(())
    } else {
        Err(ChatError::InvalidTransition(from, to))
    }
}

/// Keyword-driven mode classifier built from [`ChatConfig`].
#[derive(Debug, Clone)]
pub struct ModeDetector {
    generate_triggers: Vec<String>,
    ba_keywords: Vec<String>,
    reset_commands: Vec<String>,
}

impl Default for ModeDetector {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

fn lowered(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ModeDetector {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            generate_triggers: lowered(&config.generate_triggers),
            ba_keywords: lowered(&config.ba_keywords),
            reset_commands: lowered(&config.reset_commands),
        }
    }

    /// Classify `message` in the context of recent `history`.
    ///
    /// A generate trigger in the message wins outright. Otherwise BA
    /// keywords are looked for in the message plus the last four history
    /// entries.
    pub fn detect(&self, message: &str, history: &[Message]) -> ConversationMode {
        let msg = message.to_lowercase();
        if self.generate_triggers.iter().any(|t| msg.contains(t.as_str())) {
            return ConversationMode::Generating;
        }

        let start = history.len().saturating_sub(KEYWORD_WINDOW);
        let mut combined = msg;
        for entry in &history[start..] {
            combined.push(' ');
            combined.push_str(&entry.content.to_lowercase());
        }

        if self.ba_keywords.iter().any(|k| combined.contains(k.as_str())) {
            ConversationMode::Gathering
        } else {
            ConversationMode::General
        }
    }

    /// Whether the whole message is a reset command.
    pub fn is_reset(&self, message: &str) -> bool {
        let msg = message.trim().to_lowercase();
        let msg = msg.trim_end_matches(['.', '!']);
        self.reset_commands.iter().any(|c| c == msg)
    }

    /// Advance the session mode for one turn.
    pub fn next_mode(
        &self,
        previous: ConversationMode,
        detected: ConversationMode,
        message: &str,
    ) -> ConversationMode {
        use ConversationMode::*;

        let reset = self.is_reset(message);
        let next = if reset {
            General
        } else {
            match (previous, detected) {
                (_, Generating) => Generating,
                (Gathering | Generating, General) => Gathering,
                (Generating, Gathering) => Gathering,
                (_, detected) => detected,
            }
        };

        match validate_transition(previous, next, reset) {
            Ok(()) => next,
            Err(e) => {
                warn!(error = %e, "Rejected mode transition, keeping previous mode");
                previous
            }
        }
    }
}
