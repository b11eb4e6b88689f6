//! In-memory vector index with brute-force cosine similarity search.
//!
//! Knowledge bases for this assistant are a handful of guides, so O(n)
//! search is fast enough and keeps the index trivially rebuildable from
//! SQLite.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use analyst_core::error::AnalystError;

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    /// Cosine similarity score (-1.0 to 1.0).
    pub score: f64,
    /// File the chunk came from.
    pub source: String,
    pub content: String,
}

#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    source: String,
    content: String,
}

/// In-memory vector index using brute-force cosine similarity.
///
/// Thread-safe via interior RwLock; clones share the same entries.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Arc<RwLock<HashMap<Uuid, VectorEntry>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a chunk embedding. Overwrites any existing entry with the same ID.
    pub fn insert(
        &self,
        id: Uuid,
        embedding: Vec<f32>,
        source: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), AnalystError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| AnalystError::Retrieval(format!("Lock poisoned: {}", e)))?;
        entries.insert(
            id,
            VectorEntry {
                embedding,
                source: source.into(),
                content: content.into(),
            },
        );
        Ok(())
    }

    /// Search for the k nearest neighbors to the query vector by cosine similarity.
    ///
    /// Returns results sorted by descending similarity score.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, AnalystError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| AnalystError::Retrieval(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<SearchHit> = entries
            .iter()
            .map(|(id, entry)| SearchHit {
                id: *id,
                score: cosine_similarity(query, &entry.embedding),
                source: entry.source.clone(),
                content: entry.content.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), AnalystError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| AnalystError::Retrieval(format!("Lock poisoned: {}", e)))?;
        entries.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
