//! Retrieval seam used by the conversation controller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use analyst_core::error::AnalystError;

use crate::knowledge::KnowledgeBase;

/// Fetches reference snippets relevant to a piece of text.
///
/// Callers treat any error as "no context", so implementations should not
/// retry internally.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ordered snippets, most relevant first.
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, AnalystError>;
}

/// [`Retriever`] over a [`KnowledgeBase`].
#[derive(Debug, Clone)]
pub struct KnowledgeRetriever {
    kb: Arc<KnowledgeBase>,
    top_k: usize,
}

impl KnowledgeRetriever {
    pub fn new(kb: Arc<KnowledgeBase>, top_k: usize) -> Self {
        Self {
            kb,
            top_k: top_k.max(1),
        }
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }
}

#[async_trait]
impl Retriever for KnowledgeRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, AnalystError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let hits = self.kb.search(query, self.top_k).await?;
        debug!(hits = hits.len(), top_k = self.top_k, "Retrieved reference snippets");
        Ok(hits.into_iter().map(|hit| hit.content).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;
    use crate::splitter::TextSplitter;
    use analyst_storage::Database;

    async fn make_retriever(docs: &[(&str, &str)], top_k: usize) -> (KnowledgeRetriever, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        for (name, body) in docs {
            std::fs::write(tmp.path().join(name), body).unwrap();
        }
        let kb = KnowledgeBase::new(
            tmp.path(),
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(MockEmbedding::new()),
            TextSplitter::new(30, 0),
        );
        kb.index_directory().await.unwrap();
        (KnowledgeRetriever::new(Arc::new(kb), top_k), tmp)
    }

    #[tokio::test]
    async fn test_retrieve_returns_top_k_contents() {
        let (retriever, _tmp) = make_retriever(
            &[(
                "guide.txt",
                "Identify stakeholders.\n\nWrite user stories.\n\nAgree on acceptance criteria.",
            )],
            2,
        )
        .await;

        let snippets = retriever.retrieve("Write user stories.").await.unwrap();
        assert_eq!(snippets.len(), 2);
        // Identical text hashes to an identical vector, so it ranks first.
        assert_eq!(snippets[0], "Write user stories.");
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let (retriever, _tmp) = make_retriever(&[("guide.txt", "Some guidance text.")], 3).await;
        assert!(retriever.retrieve("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let (retriever, _tmp) = make_retriever(&[("guide.txt", "Scope first.")], 3).await;
        let dynamic: Arc<dyn Retriever> = Arc::new(retriever);
        assert_eq!(dynamic.retrieve("Scope first.").await.unwrap(), vec!["Scope first."]);
    }
}
