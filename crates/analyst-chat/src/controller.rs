//! Per-turn conversation pipeline.
//!
//! A turn runs in a spawned task that feeds a bounded channel:
//! sanitize -> detect -> advance mode -> retrieve -> assemble -> model ->
//! clean -> emit. Errors never escape as `Err`; they become a terminal
//! [`TurnEvent::Failed`] so the HTTP body can show them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use analyst_core::config::ChatConfig;
use analyst_core::types::{ConversationMode, Message};
use analyst_llm::{ChatModel, ChatRequest, LlmError};
use analyst_vector::Retriever;

use crate::cleaner::ResponseCleaner;
use crate::error::ChatError;
use crate::history::{sanitize, RelevancePolicy};
use crate::mode::ModeDetector;
use crate::prompt::{assemble, options_for};

pub const SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Error: language model service unavailable. Check that the model server is running.";

/// Snippets at or below this length carry too little to help.
pub const DEFAULT_MIN_SNIPPET_CHARS: usize = 50;
const MAX_SNIPPETS: usize = 3;
const CHANNEL_CAPACITY: usize = 64;

/// One event of a streamed turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Text for the client.
    Chunk(String),
    /// Terminal error text, always prefixed `Error`.
    Failed(String),
    /// The turn finished; `reply` is the full emitted text.
    Completed {
        reply: String,
        mode: ConversationMode,
    },
}

impl TurnEvent {
    /// Text that belongs in the response body, if any.
    pub fn body_text(&self) -> Option<&str> {
        match self {
            TurnEvent::Chunk(text) | TurnEvent::Failed(text) => Some(text),
            TurnEvent::Completed { .. } => None,
        }
    }
}

/// Finite, non-restartable stream of turn events.
pub type TurnStream = ReceiverStream<TurnEvent>;

/// Drives single conversation turns against the shared services.
#[derive(Clone)]
pub struct ConversationController {
    model: Option<Arc<dyn ChatModel>>,
    retriever: Option<Arc<dyn Retriever>>,
    policy: Arc<dyn RelevancePolicy>,
    detector: ModeDetector,
    cleaner: ResponseCleaner,
    max_turns: usize,
    max_message_chars: usize,
    emit_delay: Duration,
    min_snippet_chars: usize,
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationController")
            .field("model", &self.model.as_ref().map(|m| m.name()))
            .field("retriever", &self.retriever.is_some())
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl ConversationController {
    pub fn new(
        config: &ChatConfig,
        model: Option<Arc<dyn ChatModel>>,
        retriever: Option<Arc<dyn Retriever>>,
        policy: Arc<dyn RelevancePolicy>,
    ) -> Self {
        Self {
            model,
            retriever,
            policy,
            detector: ModeDetector::from_config(config),
            cleaner: ResponseCleaner::new(config.fallback_question.clone()),
            max_turns: config.max_turns,
            max_message_chars: config.max_message_chars,
            emit_delay: Duration::from_millis(config.emit_delay_ms),
            min_snippet_chars: DEFAULT_MIN_SNIPPET_CHARS,
        }
    }

    pub fn with_min_snippet_chars(mut self, chars: usize) -> Self {
        self.min_snippet_chars = chars;
        self
    }

    pub fn with_emit_delay(mut self, delay: Duration) -> Self {
        self.emit_delay = delay;
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Trim and bound-check a user message.
    pub fn validate_message(&self, message: &str) -> Result<String, ChatError> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if trimmed.chars().count() > self.max_message_chars {
            return Err(ChatError::MessageTooLong(self.max_message_chars));
        }
        Ok(trimmed.to_string())
    }

    /// Start a turn. The returned stream ends after `Completed` or `Failed`.
    pub fn run_turn(
        &self,
        history: Vec<Message>,
        message: String,
        previous: ConversationMode,
    ) -> TurnStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let this = self.clone();
        tokio::spawn(async move {
            this.drive(history, message, previous, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive(
        &self,
        history: Vec<Message>,
        message: String,
        previous: ConversationMode,
        tx: mpsc::Sender<TurnEvent>,
    ) {
        let sanitized = sanitize(&history, self.max_turns, self.policy.as_ref());
        let detected = self.detector.detect(&message, &sanitized);
        let mode = self.detector.next_mode(previous, detected, &message);
        info!(
            previous = %previous,
            detected = %detected,
            mode = %mode,
            history = sanitized.len(),
            "Turn started"
        );

        let Some(model) = self.model.clone() else {
            warn!("No language model configured");
            let _ = tx
                .send(TurnEvent::Failed(SERVICE_UNAVAILABLE_MESSAGE.to_string()))
                .await;
            return;
        };

        let context = if mode.uses_retrieval() {
            self.retrieve(&message).await
        } else {
            Vec::new()
        };

        let prompt = assemble(mode, &sanitized, &context, &message);
        let request = ChatRequest::new(prompt.messages, options_for(mode));

        let outcome = match mode {
            ConversationMode::Gathering => self.emit_question(model.as_ref(), &request, &tx).await,
            _ => forward_stream(model.as_ref(), &request, &tx).await,
        };

        match outcome {
            Ok(Some(reply)) => {
                debug!(mode = %mode, chars = reply.len(), "Turn completed");
                let _ = tx.send(TurnEvent::Completed { reply, mode }).await;
            }
            Ok(None) => debug!("Client disconnected mid-turn"),
            Err(e) => {
                error!(model = model.name(), error = %e, "Generation failed");
                let _ = tx.send(TurnEvent::Failed(format!("Error: {}", e))).await;
            }
        }
    }

    /// Fetch reference snippets. Failures degrade to no context.
    async fn retrieve(&self, message: &str) -> Vec<String> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        match retriever.retrieve(message).await {
            Ok(snippets) => snippets
                .into_iter()
                .filter(|s| s.trim().chars().count() > self.min_snippet_chars)
                .take(MAX_SNIPPETS)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without reference context");
                Vec::new()
            }
        }
    }

    /// Complete call, clean to one question, then emit it character by
    /// character. `Ok(None)` means the receiver went away.
    async fn emit_question(
        &self,
        model: &dyn ChatModel,
        request: &ChatRequest,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Result<Option<String>, LlmError> {
        let raw = model.chat(request).await?;
        let question = self.cleaner.clean(&raw, ConversationMode::Gathering);
        debug!(raw_chars = raw.len(), question = %question, "Cleaned gathering reply");

        for c in question.chars() {
            if tx.send(TurnEvent::Chunk(c.to_string())).await.is_err() {
                return Ok(None);
            }
            if !self.emit_delay.is_zero() {
                tokio::time::sleep(self.emit_delay).await;
            }
        }
        Ok(Some(question))
    }
}

/// Forward model chunks as they arrive.
async fn forward_stream(
    model: &dyn ChatModel,
    request: &ChatRequest,
    tx: &mpsc::Sender<TurnEvent>,
) -> Result<Option<String>, LlmError> {
    let mut stream = model.chat_stream(request).await?;
    let mut reply = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        reply.push_str(&chunk);
        if tx.send(TurnEvent::Chunk(chunk)).await.is_err() {
            return Ok(None);
        }
    }

    if reply.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(Some(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::AllowAllPolicy;
    use analyst_core::error::AnalystError;
    use analyst_llm::ScriptedModel;
    use async_trait::async_trait;

    struct StaticRetriever(Vec<String>);

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<String>, AnalystError> {
            Ok(self.0.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<String>, AnalystError> {
            Err(AnalystError::Retrieval("index offline".into()))
        }
    }

    fn config() -> ChatConfig {
        ChatConfig {
            emit_delay_ms: 0,
            ..ChatConfig::default()
        }
    }

    fn controller(
        model: Option<Arc<ScriptedModel>>,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> ConversationController {
        ConversationController::new(
            &config(),
            model.map(|m| m as Arc<dyn ChatModel>),
            retriever,
            Arc::new(AllowAllPolicy),
        )
    }

    async fn collect(stream: TurnStream) -> Vec<TurnEvent> {
        stream.collect().await
    }

    fn body(events: &[TurnEvent]) -> String {
        events.iter().filter_map(|e| e.body_text()).collect()
    }

    fn long_snippet(tag: &str) -> String {
        format!("{} {}", tag, "Stakeholder interviews come before any document is drafted. ".repeat(2))
    }

    // =====================================================================
    // Gathering
    // =====================================================================

    #[tokio::test]
    async fn test_gathering_turn_emits_single_question() {
        let model = Arc::new(
            ScriptedModel::default()
                .with_reply("1. What is your target market? 2. What is your budget?"),
        );
        let ctrl = controller(Some(model.clone()), None);

        let events = collect(ctrl.run_turn(
            vec![],
            "I have a business idea for a bakery".into(),
            ConversationMode::General,
        ))
        .await;

        assert_eq!(body(&events), "What is your target market?");
        assert_eq!(
            events.last(),
            Some(&TurnEvent::Completed {
                reply: "What is your target market?".into(),
                mode: ConversationMode::Gathering,
            })
        );
        // One chunk per character.
        assert_eq!(events.len(), "What is your target market?".chars().count() + 1);

        let request = &model.requests()[0];
        assert_eq!(request.options.num_predict, Some(150));
    }

    #[tokio::test]
    async fn test_sticky_gathering_on_keyword_free_reply() {
        let model = Arc::new(ScriptedModel::new("How many stores do you plan?"));
        let ctrl = controller(Some(model), None);

        let events = collect(ctrl.run_turn(
            vec![
                Message::user("I run a bakery"),
                Message::assistant("Who buys from you?"),
            ],
            "mostly office workers".into(),
            ConversationMode::Gathering,
        ))
        .await;

        assert!(matches!(
            events.last(),
            Some(TurnEvent::Completed { mode: ConversationMode::Gathering, .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_returns_general_and_streams() {
        let model = Arc::new(ScriptedModel::new("Sure, starting fresh."));
        let ctrl = controller(Some(model), None);

        let events = collect(ctrl.run_turn(vec![], "reset".into(), ConversationMode::Gathering)).await;
        assert_eq!(body(&events), "Sure, starting fresh.");
        assert!(matches!(
            events.last(),
            Some(TurnEvent::Completed { mode: ConversationMode::General, .. })
        ));
    }

    // =====================================================================
    // Generating / general
    // =====================================================================

    #[tokio::test]
    async fn test_generating_forwards_chunks_unchanged() {
        let reply = "## Functional Requirements\n1. The system shall take orders.\n2. The system shall bill.";
        let model = Arc::new(ScriptedModel::default().with_reply(reply).with_chunk_chars(10));
        let ctrl = controller(Some(model.clone()), None);

        let events = collect(ctrl.run_turn(
            vec![Message::user("bakery project"), Message::assistant("Who buys?")],
            "generate requirements".into(),
            ConversationMode::Gathering,
        ))
        .await;

        assert_eq!(body(&events), reply);
        assert!(events.len() > 3);
        assert_eq!(
            events.last(),
            Some(&TurnEvent::Completed {
                reply: reply.into(),
                mode: ConversationMode::Generating,
            })
        );
        assert_eq!(model.requests()[0].options.top_k, Some(40));
    }

    #[tokio::test]
    async fn test_general_mode_skips_retrieval() {
        let model = Arc::new(ScriptedModel::new("Hello!"));
        let retriever: Arc<dyn Retriever> = Arc::new(StaticRetriever(vec![long_snippet("guide")]));
        let ctrl = controller(Some(model.clone()), Some(retriever));

        collect(ctrl.run_turn(vec![], "hello".into(), ConversationMode::General)).await;
        assert!(!model.requests()[0].messages[0]
            .content
            .contains("REFERENCE DOCUMENTS"));
    }

    // =====================================================================
    // Retrieval
    // =====================================================================

    #[tokio::test]
    async fn test_snippets_filtered_and_capped() {
        let model = Arc::new(ScriptedModel::new("Who are the stakeholders?"));
        let retriever: Arc<dyn Retriever> = Arc::new(StaticRetriever(vec![
            "too short".into(),
            long_snippet("one"),
            long_snippet("two"),
            long_snippet("three"),
            long_snippet("four"),
        ]));
        let ctrl = controller(Some(model.clone()), Some(retriever));

        collect(ctrl.run_turn(vec![], "my project".into(), ConversationMode::General)).await;

        let system = &model.requests()[0].messages[0].content;
        assert!(system.contains("REFERENCE DOCUMENTS"));
        assert!(!system.contains("too short"));
        assert!(system.contains("three Stakeholder"));
        assert!(!system.contains("four Stakeholder"));
    }

    #[tokio::test]
    async fn test_failing_retriever_still_completes() {
        let model = Arc::new(ScriptedModel::new("What is your timeline?"));
        let retriever: Arc<dyn Retriever> = Arc::new(FailingRetriever);
        let ctrl = controller(Some(model.clone()), Some(retriever));

        let events = collect(ctrl.run_turn(vec![], "project budget".into(), ConversationMode::General)).await;
        assert!(matches!(events.last(), Some(TurnEvent::Completed { .. })));
        assert!(!model.requests()[0].messages[0]
            .content
            .contains("REFERENCE DOCUMENTS"));
    }

    // =====================================================================
    // Failures
    // =====================================================================

    #[tokio::test]
    async fn test_no_model_emits_single_error() {
        let ctrl = controller(None, None);
        let events = collect(ctrl.run_turn(vec![], "hi".into(), ConversationMode::General)).await;
        assert_eq!(
            events,
            vec![TurnEvent::Failed(SERVICE_UNAVAILABLE_MESSAGE.to_string())]
        );
    }

    #[tokio::test]
    async fn test_model_failure_is_terminal_error_chunk() {
        let model = Arc::new(ScriptedModel::default().with_failure(LlmError::Unavailable {
            provider: "Ollama".into(),
            message: "connection refused".into(),
        }));
        let ctrl = controller(Some(model), None);

        let events = collect(ctrl.run_turn(vec![], "my project".into(), ConversationMode::General)).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            TurnEvent::Failed(text) => {
                assert!(text.starts_with("Error:"));
                assert!(text.contains("connection refused"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_is_error() {
        let model = Arc::new(ScriptedModel::default().with_reply(""));
        let ctrl = controller(Some(model), None);
        let events = collect(ctrl.run_turn(vec![], "hello".into(), ConversationMode::General)).await;
        assert!(matches!(events.as_slice(), [TurnEvent::Failed(_)]));
    }

    #[tokio::test]
    async fn test_dropped_stream_stops_turn() {
        let model = Arc::new(ScriptedModel::new("What is your budget?"));
        let ctrl = controller(Some(model.clone()), None).with_emit_delay(Duration::from_millis(20));
        let mut stream = ctrl.run_turn(vec![], "project".into(), ConversationMode::General);
        let first = stream.next().await;
        assert_eq!(first, Some(TurnEvent::Chunk("W".into())));
        drop(stream);
        drop(ctrl);

        // Emitting the whole question takes ~400ms. The producer task owns
        // a model handle until it returns, so only ours is left once it
        // notices the closed channel.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(Arc::strong_count(&model), 1);
        assert_eq!(model.requests().len(), 1);
    }

    // =====================================================================
    // Validation and mode selection
    // =====================================================================

    #[test]
    fn test_validate_message() {
        let ctrl = controller(None, None);
        assert!(matches!(ctrl.validate_message("   "), Err(ChatError::EmptyMessage)));
        assert!(matches!(
            ctrl.validate_message(&"x".repeat(4001)),
            Err(ChatError::MessageTooLong(4000))
        ));
        assert_eq!(ctrl.validate_message("  hi  ").unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_mode_detection_uses_sanitized_history() {
        let model = Arc::new(ScriptedModel::new("Sure thing."));
        let ctrl = ConversationController::new(
            &config(),
            Some(model as Arc<dyn ChatModel>),
            None,
            Arc::new(crate::history::KeywordRelevancePolicy::new(["joke"])),
        );
        // The only keyword sits in an off-topic message that gets filtered.
        let history = vec![Message::user("tell me a joke about a project")];
        let events = collect(ctrl.run_turn(history, "ok".into(), ConversationMode::General)).await;
        assert_eq!(
            events.last(),
            Some(&TurnEvent::Completed {
                reply: "Sure thing.".into(),
                mode: ConversationMode::General,
            })
        );
    }
}
