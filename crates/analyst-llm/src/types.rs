//! Request types shared by every provider.

use serde::{Deserialize, Serialize};

use analyst_core::types::{Message, Role};

/// Sampling options for one model call.
///
/// Field names follow Ollama's `options` object; the Gemini client maps
/// them onto `generationConfig`. `None` leaves the provider default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl GenerationOptions {
    pub fn temperature(mut self, value: f32) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn num_predict(mut self, value: u32) -> Self {
        self.num_predict = Some(value);
        self
    }

    pub fn top_p(mut self, value: f32) -> Self {
        self.top_p = Some(value);
        self
    }

    pub fn top_k(mut self, value: u32) -> Self {
        self.top_k = Some(value);
        self
    }

    pub fn repeat_penalty(mut self, value: f32) -> Self {
        self.repeat_penalty = Some(value);
        self
    }

    pub fn stop<I, S>(mut self, sequences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = sequences.into_iter().map(Into::into).collect();
        self
    }
}

/// A complete chat request: ordered messages plus sampling options.
///
/// By convention the first message is the system instruction and the last
/// one is the user's latest message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>, options: GenerationOptions) -> Self {
        Self { messages, options }
    }

    /// Concatenated content of all system messages.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Messages without the system instruction.
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}
