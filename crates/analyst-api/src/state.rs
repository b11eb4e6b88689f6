//! Application state shared across all route handlers.
//!
//! AppState holds the repositories and the conversation services. It is
//! passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use analyst_chat::{BrdGenerator, ConversationController, RelevancePolicy, RequirementAnalyzer};
use analyst_core::config::AnalystConfig;
use analyst_llm::ChatModel;
use analyst_storage::{Database, KnowledgeRepository, SessionRepository};
use analyst_vector::Retriever;

/// Shared application state.
///
/// All fields are cheap to clone; the services inside are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AnalystConfig>,
    /// SQLite database for persistent storage.
    pub database: Arc<Database>,
    pub sessions: SessionRepository,
    pub knowledge: KnowledgeRepository,
    /// Configured language model, `None` when the provider could not be set up.
    pub model: Option<Arc<dyn ChatModel>>,
    pub controller: ConversationController,
    pub brd: BrdGenerator,
    pub analyzer: RequirementAnalyzer,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the given components.
    pub fn new(
        config: AnalystConfig,
        database: Arc<Database>,
        model: Option<Arc<dyn ChatModel>>,
        retriever: Option<Arc<dyn Retriever>>,
        policy: Arc<dyn RelevancePolicy>,
    ) -> Self {
        let controller = ConversationController::new(
            &config.chat,
            model.clone(),
            retriever,
            policy,
        )
        .with_min_snippet_chars(config.retrieval.min_snippet_chars);
        let brd = BrdGenerator::new(&config.brd, model.clone());
        let analyzer = RequirementAnalyzer::new(model.clone(), config.chat.max_message_chars);

        Self {
            sessions: SessionRepository::new(Arc::clone(&database)),
            knowledge: KnowledgeRepository::new(Arc::clone(&database)),
            config: Arc::new(config),
            database,
            model,
            controller,
            brd,
            analyzer,
            start_time: Instant::now(),
        }
    }
}
