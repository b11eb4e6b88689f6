//! Scripted chat model for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::provider::{ChatModel, TextStream};
use crate::types::ChatRequest;

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(LlmError),
}

/// A [`ChatModel`] that replays queued replies in order and records every
/// request it receives. When the queue is empty it answers with the
/// default reply.
#[derive(Debug)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    default_reply: String,
    requests: Mutex<Vec<ChatRequest>>,
    chunk_chars: usize,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new("What problem does your business solve?")
    }
}

impl ScriptedModel {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.into(),
            requests: Mutex::new(Vec::new()),
            chunk_chars: 16,
        }
    }

    /// Queue a successful reply.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(text.into()));
        self
    }

    /// Queue a failure.
    pub fn with_failure(self, err: LlmError) -> Self {
        self.push(ScriptedReply::Fail(err));
        self
    }

    /// Size of the pieces `chat_stream` splits a reply into.
    pub fn with_chunk_chars(mut self, chars: usize) -> Self {
        self.chunk_chars = chars.max(1);
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next(&self, request: &ChatRequest) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let reply = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(err)) => Err(err),
            None => Ok(self.default_reply.clone()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.next(request)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let text = self.next(request)?;
        let chars: Vec<char> = text.chars().collect();
        let chunks: Vec<Result<String, LlmError>> = chars
            .chunks(self.chunk_chars)
            .map(|c| Ok(c.iter().collect()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        Ok(())
    }
}
