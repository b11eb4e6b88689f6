//! Reference knowledge base: `.txt` guides split, embedded, persisted to
//! SQLite and searched in memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use analyst_core::error::AnalystError;
use analyst_storage::{Database, KnowledgeChunk, KnowledgeRepository};

use crate::embedding::DynEmbeddingService;
use crate::index::{SearchHit, VectorIndex};
use crate::splitter::TextSplitter;

/// File written into an empty knowledge directory.
pub const DEFAULT_GUIDE_NAME: &str = "ba_guide.txt";

pub const DEFAULT_GUIDE: &str = "\
Business Analysis Basics:
- Always ask clarifying questions
- Understand business goals first
- Identify stakeholders and users
- Document functional and non-functional requirements
- Create user stories and acceptance criteria

Requirements Discovery:
- Ask one question at a time and build on the previous answer
- Confirm the target market, the budget and the timeline early
- Separate what the system must do from how well it must do it
- Record constraints and assumptions as soon as they surface
";

/// Outcome of indexing a knowledge directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files: usize,
    pub chunks: usize,
    /// Files that could not be read or embedded.
    pub skipped: Vec<String>,
}

/// Create `dir` if needed and seed the default guide when it holds no
/// `.txt` files. Returns true when the guide was written.
pub fn ensure_knowledge_dir(dir: &Path) -> Result<bool, AnalystError> {
    std::fs::create_dir_all(dir)?;
    if !text_files(dir)?.is_empty() {
        return Ok(false);
    }
    let path = dir.join(DEFAULT_GUIDE_NAME);
    std::fs::write(&path, DEFAULT_GUIDE)?;
    info!(path = %path.display(), "Seeded knowledge base with default guide");
    Ok(true)
}

/// `.txt` files directly inside `dir`, sorted by name.
fn text_files(dir: &Path) -> Result<Vec<PathBuf>, AnalystError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("txt")
        })
        .collect();
    files.sort();
    Ok(files)
}

pub struct KnowledgeBase {
    dir: PathBuf,
    embedder: Arc<dyn DynEmbeddingService>,
    repo: KnowledgeRepository,
    index: VectorIndex,
    splitter: TextSplitter,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("dir", &self.dir)
            .field("chunks", &self.index.len())
            .finish()
    }
}

impl KnowledgeBase {
    pub fn new(
        dir: impl Into<PathBuf>,
        db: Arc<Database>,
        embedder: Arc<dyn DynEmbeddingService>,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            dir: dir.into(),
            embedder,
            repo: KnowledgeRepository::new(db),
            index: VectorIndex::new(),
            splitter,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of chunks currently searchable.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rebuild the in-memory index from persisted chunks.
    pub fn load(&self) -> Result<usize, AnalystError> {
        let chunks = self.repo.all()?;
        self.index.clear()?;
        for chunk in &chunks {
            self.index
                .insert(chunk.id, chunk.embedding.clone(), &chunk.source, &chunk.content)?;
        }
        info!(chunks = chunks.len(), "Loaded knowledge base");
        Ok(chunks.len())
    }

    /// Load persisted chunks, indexing the directory first if nothing has
    /// been stored yet.
    pub async fn load_or_index(&self) -> Result<usize, AnalystError> {
        if self.repo.count()? == 0 {
            ensure_knowledge_dir(&self.dir)?;
            self.index_directory().await?;
        }
        self.load()
    }

    /// Split and embed every `.txt` file in the directory, replacing all
    /// persisted chunks. Unreadable files are skipped with a warning.
    pub async fn index_directory(&self) -> Result<IndexReport, AnalystError> {
        let files = text_files(&self.dir)?;
        let mut report = IndexReport::default();
        self.repo.clear()?;
        self.index.clear()?;

        for path in files {
            let source = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match self.index_file(&path, &source).await {
                Ok(count) => {
                    report.files += 1;
                    report.chunks += count;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping knowledge file");
                    report.skipped.push(source);
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            files = report.files,
            chunks = report.chunks,
            "Indexed knowledge base"
        );
        Ok(report)
    }

    async fn index_file(&self, path: &Path, source: &str) -> Result<usize, AnalystError> {
        let text = tokio::fs::read_to_string(path).await?;
        let mut chunks = Vec::new();
        for (chunk_index, content) in self.splitter.split(&text).into_iter().enumerate() {
            let embedding = self.embedder.embed_boxed(&content).await?;
            chunks.push(KnowledgeChunk {
                id: Uuid::new_v4(),
                source: source.to_string(),
                chunk_index,
                content,
                embedding,
            });
        }

        self.repo.replace_source(source, &chunks)?;
        for chunk in &chunks {
            self.index
                .insert(chunk.id, chunk.embedding.clone(), source, &chunk.content)?;
        }
        Ok(chunks.len())
    }

    /// Embed `query` and return the `k` most similar chunks.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, AnalystError> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed_boxed(query).await?;
        self.index.search(&embedding, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;

    fn make_kb(dir: &Path) -> (KnowledgeBase, Arc<Database>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let kb = KnowledgeBase::new(
            dir,
            db.clone(),
            Arc::new(MockEmbedding::new()),
            TextSplitter::new(80, 10),
        );
        (kb, db)
    }

    #[test]
    fn test_ensure_seeds_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("knowledge");

        assert!(ensure_knowledge_dir(&dir).unwrap());
        let guide = std::fs::read_to_string(dir.join(DEFAULT_GUIDE_NAME)).unwrap();
        assert!(guide.contains("Always ask clarifying questions"));

        // Second call leaves the directory alone.
        assert!(!ensure_knowledge_dir(&dir).unwrap());
    }

    #[test]
    fn test_ensure_keeps_existing_docs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("custom.txt"), "Custom guidance").unwrap();

        assert!(!ensure_knowledge_dir(tmp.path()).unwrap());
        assert!(!tmp.path().join(DEFAULT_GUIDE_NAME).exists());
    }

    #[tokio::test]
    async fn test_index_directory_persists_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), DEFAULT_GUIDE).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "Short note on budgets.").unwrap();
        std::fs::write(tmp.path().join("ignored.md"), "# not indexed").unwrap();

        let (kb, db) = make_kb(tmp.path());
        let report = kb.index_directory().await.unwrap();

        assert_eq!(report.files, 2);
        assert!(report.chunks > 2);
        assert!(report.skipped.is_empty());
        assert_eq!(kb.len(), report.chunks);
        assert_eq!(
            KnowledgeRepository::new(db).count().unwrap(),
            report.chunks as u64
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "Short note on budgets.").unwrap();
        std::fs::write(tmp.path().join("latin1.txt"), [0x63u8, 0x61, 0x66, 0xe9]).unwrap();

        let (kb, _db) = make_kb(tmp.path());
        let report = kb.index_directory().await.unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(report.skipped, vec!["latin1.txt".to_string()]);
        assert_eq!(kb.len(), report.chunks);
    }

    #[tokio::test]
    async fn test_reindex_replaces_previous_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), DEFAULT_GUIDE).unwrap();
        let (kb, _db) = make_kb(tmp.path());

        let first = kb.index_directory().await.unwrap();
        let second = kb.index_directory().await.unwrap();
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(kb.len(), second.chunks);
    }

    #[tokio::test]
    async fn test_load_rebuilds_index_from_storage() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "Identify stakeholders early.").unwrap();
        let (kb, db) = make_kb(tmp.path());
        kb.index_directory().await.unwrap();

        let fresh = KnowledgeBase::new(
            tmp.path(),
            db,
            Arc::new(MockEmbedding::new()),
            TextSplitter::default(),
        );
        assert!(fresh.is_empty());
        assert_eq!(fresh.load().unwrap(), 1);

        let hits = fresh.search("Identify stakeholders early.", 1).await.unwrap();
        assert_eq!(hits[0].content, "Identify stakeholders early.");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_load_or_index_seeds_when_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("kb");
        let (kb, _db) = make_kb(&dir);

        let count = kb.load_or_index().await.unwrap();
        assert!(count > 0);
        assert!(dir.join(DEFAULT_GUIDE_NAME).exists());
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let tmp = tempfile::tempdir().unwrap();
        let (kb, _db) = make_kb(tmp.path());
        assert!(kb.search("anything", 3).await.unwrap().is_empty());
    }
}
