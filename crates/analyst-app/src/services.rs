//! Service registry built once at startup.
//!
//! Owns the database, the optional language model and retriever, and the
//! history relevance policy. Handlers receive clones of the `Arc`s through
//! `AppState`; nothing here is global.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use analyst_chat::{KeywordRelevancePolicy, RelevancePolicy};
use analyst_core::config::{expand_home, AnalystConfig};
use analyst_core::error::AnalystError;
use analyst_llm::{build_chat_model, ChatModel};
use analyst_storage::Database;
use analyst_vector::{
    build_embedding_service, KnowledgeBase, KnowledgeRetriever, Retriever, TextSplitter,
};

pub const DATABASE_FILE: &str = "analyst.db";

pub struct Services {
    pub database: Arc<Database>,
    /// `None` when the provider could not be configured; turns then report
    /// the service as unavailable.
    pub model: Option<Arc<dyn ChatModel>>,
    pub knowledge: Option<Arc<KnowledgeBase>>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub policy: Arc<dyn RelevancePolicy>,
}

impl Services {
    /// Open storage under `data_dir` and wire up the model and retrieval.
    ///
    /// Only storage failures are fatal. A model or knowledge base that
    /// cannot be set up is logged and left out.
    pub async fn build(config: &AnalystConfig, data_dir: &Path) -> Result<Self, AnalystError> {
        let database = open_database(data_dir)?;

        let model = match build_chat_model(&config.llm) {
            Ok(model) => {
                info!(provider = model.name(), model = model.model(), "Language model configured");
                Some(model)
            }
            Err(e) => {
                warn!(provider = %config.llm.provider, error = %e, "Language model unavailable");
                None
            }
        };

        let knowledge = if config.retrieval.enabled {
            match load_knowledge_base(config, Arc::clone(&database)).await {
                Ok(kb) => Some(kb),
                Err(e) => {
                    warn!(error = %e, "Knowledge base unavailable, continuing without retrieval");
                    None
                }
            }
        } else {
            info!("Retrieval disabled in config");
            None
        };

        let retriever = knowledge.as_ref().map(|kb| {
            Arc::new(KnowledgeRetriever::new(Arc::clone(kb), config.retrieval.top_k))
                as Arc<dyn Retriever>
        });

        let policy: Arc<dyn RelevancePolicy> = Arc::new(KeywordRelevancePolicy::new(
            config.chat.off_topic_keywords.clone(),
        ));

        Ok(Self {
            database,
            model,
            knowledge,
            retriever,
            policy,
        })
    }

    /// Flush the WAL after the server has stopped.
    pub fn shutdown(&self) {
        match self.database.checkpoint() {
            Ok(()) => info!("Database checkpointed"),
            Err(e) => warn!(error = %e, "WAL checkpoint failed"),
        }
        info!("Services shut down");
    }
}

pub fn open_database(data_dir: &Path) -> Result<Arc<Database>, AnalystError> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(DATABASE_FILE);
    let database = Database::new(&path)?;
    info!(path = %path.display(), "SQLite database opened");
    Ok(Arc::new(database))
}

/// Write `config` to `path`. An existing file is left alone unless
/// `force` is set; returns whether the file was written.
pub fn write_config(
    path: &Path,
    config: &AnalystConfig,
    force: bool,
) -> Result<bool, AnalystError> {
    if path.exists() && !force {
        return Ok(false);
    }
    config.save(path)?;
    Ok(true)
}

/// Knowledge base over `retrieval.knowledge_dir`, not yet loaded.
pub fn knowledge_base(
    config: &AnalystConfig,
    database: Arc<Database>,
) -> Result<Arc<KnowledgeBase>, AnalystError> {
    let embedder = build_embedding_service(&config.retrieval, &config.llm)?;
    let splitter = TextSplitter::new(config.retrieval.chunk_size, config.retrieval.chunk_overlap);
    Ok(Arc::new(KnowledgeBase::new(
        expand_home(&config.retrieval.knowledge_dir),
        database,
        embedder,
        splitter,
    )))
}

async fn load_knowledge_base(
    config: &AnalystConfig,
    database: Arc<Database>,
) -> Result<Arc<KnowledgeBase>, AnalystError> {
    let kb = knowledge_base(config, database)?;
    let chunks = kb.load_or_index().await?;
    info!(dir = %kb.dir().display(), chunks, "Knowledge base ready");
    Ok(kb)
}
