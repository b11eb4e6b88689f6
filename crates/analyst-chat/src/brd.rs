//! Business Requirements Document generation from a finished session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use analyst_core::config::BrdConfig;
use analyst_core::types::{ConversationMode, Message, Role};
use analyst_llm::{ChatModel, ChatRequest, GenerationOptions, LlmError};

use crate::controller::{TurnEvent, TurnStream};

pub const BRD_UNAVAILABLE_MESSAGE: &str = "Error: BRD generation service unavailable";

const QUESTION_CHARS: usize = 100;
const ANSWER_CHARS: usize = 150;

const BRD_PROMPT: &str = "\
You are a Senior Business Analyst creating a comprehensive Business Requirements Document (BRD).

INSTRUCTIONS:
1. Generate a complete, professional BRD based ONLY on the conversation provided
2. Use the exact section headers provided below
3. Be specific, actionable, and comprehensive
4. Include concrete details from the conversation
5. Format with proper markdown

BRD STRUCTURE (use these exact headers):
# Business Requirements Document

## 1. Executive Summary
[Provide a high-level overview of the project based on discussion]

## 2. Project Overview
[Describe the business context, background, and scope]

## 3. Business Objectives
[List specific, measurable business goals]

## 4. Stakeholder Analysis
[Identify key stakeholders, users, and their needs]

## 5. Functional Requirements
[List specific system functionalities and features required]

## 6. Non-Functional Requirements
[Specify performance, security, usability requirements]

## 7. Constraints and Assumptions
[Document technical and business constraints, key assumptions]

## 8. Timeline and Milestones
[Outline project timeline with key milestones]

## 9. Success Criteria
[Define measurable success metrics and KPIs]

## 10. Risks and Mitigations
[Identify potential risks and mitigation strategies]

Now, here is the conversation you need to base the BRD on:

{conversation_summary}

Generate the complete Business Requirements Document:";

const BRD_REQUEST: &str = "Generate the complete Business Requirements Document.";

/// Turns a requirements conversation into a streamed BRD.
#[derive(Clone)]
pub struct BrdGenerator {
    model: Option<Arc<dyn ChatModel>>,
    max_qa_pairs: usize,
    words_per_chunk: usize,
    emit_delay: Duration,
}

impl std::fmt::Debug for BrdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrdGenerator")
            .field("model", &self.model.as_ref().map(|m| m.name()))
            .field("max_qa_pairs", &self.max_qa_pairs)
            .field("words_per_chunk", &self.words_per_chunk)
            .finish()
    }
}

fn truncated(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        format!("{}...", text.chars().take(limit).collect::<String>())
    } else {
        text.to_string()
    }
}

impl BrdGenerator {
    pub fn new(config: &BrdConfig, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            model,
            max_qa_pairs: config.max_qa_pairs,
            words_per_chunk: config.words_per_chunk.max(1),
            emit_delay: Duration::from_millis(config.emit_delay_ms),
        }
    }

    /// Condense the conversation into the business idea plus the most
    /// recent question/answer pairs.
    pub fn summarize(&self, messages: &[Message]) -> String {
        let mut summary = String::from("CONVERSATION SUMMARY:\n\n");

        if let Some(first) = messages.iter().find(|m| m.role == Role::User) {
            summary.push_str(&format!("Business Idea: {}\n\n", first.content));
        }

        summary.push_str("Key Requirements Gathered:\n");
        let pairs: Vec<String> = messages
            .windows(2)
            .filter(|w| w[0].role == Role::Assistant && w[1].role == Role::User)
            .map(|w| {
                format!(
                    "Q: {}\nA: {}\n",
                    truncated(&w[0].content, QUESTION_CHARS),
                    truncated(&w[1].content, ANSWER_CHARS)
                )
            })
            .collect();

        let start = pairs.len().saturating_sub(self.max_qa_pairs);
        for pair in &pairs[start..] {
            summary.push_str(pair);
            summary.push('\n');
        }
        summary
    }

    /// Model request for the given conversation.
    pub fn build_request(&self, messages: &[Message]) -> ChatRequest {
        let system = BRD_PROMPT.replace("{conversation_summary}", &self.summarize(messages));
        ChatRequest::new(
            vec![Message::system(system), Message::user(BRD_REQUEST)],
            GenerationOptions::default()
                .temperature(0.2)
                .num_predict(4000)
                .top_p(0.9)
                .repeat_penalty(1.1),
        )
    }

    /// Header prepended to every generated document.
    pub fn metadata_header(messages: &[Message], generated: &str) -> String {
        let responses = messages.iter().filter(|m| m.role == Role::User).count();
        format!(
            "**Generated:** {}\n**Based on:** Requirements gathering session ({} user responses)\n**Status:** Draft\n\n",
            generated, responses
        )
    }

    /// Generate the BRD and stream it in word groups.
    ///
    /// Ends with `Completed` carrying the whole document, or with a single
    /// `Failed` event.
    pub fn generate(&self, messages: Vec<Message>) -> TurnStream {
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();
        tokio::spawn(async move {
            this.drive(messages, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive(&self, messages: Vec<Message>, tx: mpsc::Sender<TurnEvent>) {
        let Some(model) = self.model.clone() else {
            let _ = tx.send(TurnEvent::Failed(BRD_UNAVAILABLE_MESSAGE.to_string())).await;
            return;
        };

        info!(messages = messages.len(), model = model.name(), "Generating BRD");
        let body = match model.chat(&self.build_request(&messages)).await {
            Ok(body) if body.trim().is_empty() => Err(LlmError::EmptyResponse),
            other => other,
        };
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "BRD generation failed");
                let _ = tx
                    .send(TurnEvent::Failed(format!("Error generating BRD: {}", e)))
                    .await;
                return;
            }
        };

        let generated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let document = format!("{}{}", Self::metadata_header(&messages, &generated), body.trim());

        for chunk in word_chunks(&document, self.words_per_chunk) {
            if tx.send(TurnEvent::Chunk(chunk)).await.is_err() {
                return;
            }
            if !self.emit_delay.is_zero() {
                tokio::time::sleep(self.emit_delay).await;
            }
        }

        let _ = tx
            .send(TurnEvent::Completed {
                reply: document,
                mode: ConversationMode::Generating,
            })
            .await;
    }
}

/// Split `text` into groups of `words` words. Whitespace, including line
/// breaks, stays attached so the groups concatenate back to `text`.
pub fn word_chunks(text: &str, words: usize) -> Vec<String> {
    let words = words.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    let mut in_word = false;

    for c in text.chars() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            if count == words {
                chunks.push(std::mem::take(&mut current));
                count = 0;
            }
            in_word = true;
            count += 1;
        }
        current.push(c);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
