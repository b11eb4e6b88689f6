//! Reference-document retrieval: embedding services, text splitting, an
//! in-memory cosine index and the knowledge base that ties them to SQLite.

pub mod embedding;
pub mod index;
pub mod knowledge;
pub mod retriever;
pub mod splitter;

pub use embedding::{
    build_embedding_service, DynEmbeddingService, EmbeddingService, GeminiEmbedding,
    MockEmbedding, OllamaEmbedding,
};
pub use index::{SearchHit, VectorIndex};
pub use knowledge::{ensure_knowledge_dir, IndexReport, KnowledgeBase, DEFAULT_GUIDE_NAME};
pub use retriever::{KnowledgeRetriever, Retriever};
pub use splitter::TextSplitter;
