//! Embedding service trait and implementations.
//!
//! - `OllamaEmbedding` calls a local Ollama server (`/api/embeddings`).
//! - `GeminiEmbedding` calls the Gemini `embedContent` endpoint.
//! - `MockEmbedding` provides deterministic hash-based vectors. It backs
//!   the `hash` provider for offline runs and every test in the workspace.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use analyst_core::config::{LlmConfig, RetrievalConfig};
use analyst_core::error::AnalystError;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// Vector size of `nomic-embed-text` and `text-embedding-004`.
pub const DEFAULT_DIMENSIONS: usize = 768;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors that capture
/// semantic meaning. Used for both indexing and query.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, AnalystError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, allowing
/// `Arc<dyn DynEmbeddingService>` to be shared without generics.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, AnalystError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, AnalystError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Build the embedding service named by `retrieval.embedding_provider`.
pub fn build_embedding_service(
    retrieval: &RetrievalConfig,
    llm: &LlmConfig,
) -> Result<Arc<dyn DynEmbeddingService>, AnalystError> {
    let timeout = Duration::from_secs(llm.timeout_secs.max(1));
    let service: Arc<dyn DynEmbeddingService> =
        match retrieval.embedding_provider.to_lowercase().as_str() {
            "ollama" => Arc::new(OllamaEmbedding::new(
                &llm.ollama_url,
                &retrieval.embedding_model,
                timeout,
            )?),
            "gemini" => {
                let key = std::env::var(&llm.gemini_api_key_env).map_err(|_| {
                    AnalystError::Config(format!("{} is not set", llm.gemini_api_key_env))
                })?;
                Arc::new(GeminiEmbedding::new(
                    &llm.gemini_base_url,
                    &retrieval.embedding_model,
                    key,
                    timeout,
                )?)
            }
            "hash" | "mock" => Arc::new(MockEmbedding::new()),
            other => {
                return Err(AnalystError::Config(format!(
                    "unknown embedding provider '{}' (expected 'ollama', 'gemini' or 'hash')",
                    other
                )))
            }
        };
    info!(
        provider = %retrieval.embedding_provider,
        model = %retrieval.embedding_model,
        "Embedding service configured"
    );
    Ok(service)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, AnalystError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| AnalystError::Config(format!("failed to build HTTP client: {}", e)))
}

async fn checked(response: reqwest::Response, provider: &str) -> Result<reqwest::Response, AnalystError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AnalystError::Retrieval(format!(
        "{} embedding request failed ({}): {}",
        provider,
        status.as_u16(),
        body.trim()
    )))
}

fn reject_empty(text: &str) -> Result<(), AnalystError> {
    if text.trim().is_empty() {
        return Err(AnalystError::Retrieval("Cannot embed empty text".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// OllamaEmbedding
// ---------------------------------------------------------------------------

/// Embeddings from an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    http: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalystError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }
}

impl EmbeddingService for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalystError> {
        reject_empty(text)?;
        let url = format!("{}/api/embeddings", self.base_url);
        debug!(model = %self.model, chars = text.len(), "Ollama embedding request");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|e| AnalystError::Retrieval(format!("Ollama embedding request failed: {}", e)))?;
        let parsed: OllamaEmbeddingResponse = checked(response, "Ollama")
            .await?
            .json()
            .await
            .map_err(|e| AnalystError::Retrieval(format!("invalid Ollama embedding response: {}", e)))?;

        if parsed.embedding.is_empty() {
            return Err(AnalystError::Retrieval(
                "Ollama returned an empty embedding".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// GeminiEmbedding
// ---------------------------------------------------------------------------

/// Embeddings from the Gemini API.
#[derive(Clone)]
pub struct GeminiEmbedding {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimensions: usize,
}

impl std::fmt::Debug for GeminiEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbedding")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

impl GeminiEmbedding {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalystError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into().trim_start_matches("models/").to_string(),
            api_key: api_key.into(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }
}

impl EmbeddingService for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalystError> {
        reject_empty(text)?;
        let url = format!(
            "{}/v1beta/models/{}:embedContent",
            self.base_url, self.model
        );
        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] }
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalystError::Retrieval(format!("Gemini embedding request failed: {}", e)))?;
        let parsed: GeminiEmbeddingResponse = checked(response, "Gemini")
            .await?
            .json()
            .await
            .map_err(|e| AnalystError::Retrieval(format!("invalid Gemini embedding response: {}", e)))?;

        if parsed.embedding.values.is_empty() {
            return Err(AnalystError::Retrieval(
                "Gemini returned an empty embedding".to_string(),
            ));
        }
        Ok(parsed.embedding.values)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors
// ---------------------------------------------------------------------------

/// Embedding service that returns deterministic 384-dimensional vectors.
///
/// The output is derived from a hash of the input text, so identical inputs
/// always produce identical outputs. There is no semantic similarity between
/// different texts.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedding;

impl MockEmbedding {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(384);
        for i in 0..384 {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalystError> {
        reject_empty(text)?;
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        384
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    // ========================================================================
    // MockEmbedding
    // ========================================================================

    #[tokio::test]
    async fn test_mock_embedding_dimension() {
        let service = MockEmbedding::new();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), 384);
    }

    #[tokio::test]
    async fn test_mock_embedding_deterministic() {
        let service = MockEmbedding::new();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_different_inputs() {
        let service = MockEmbedding::new();
        let v1 = service.embed("text one").await.unwrap();
        let v2 = service.embed("text two").await.unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn test_mock_embedding_empty_text() {
        let service = MockEmbedding::new();
        assert!(service.embed("").await.is_err());
        assert!(service.embed("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_embedding_is_unit_length() {
        let vec = MockEmbedding::new().embed("unit").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_dyn_dispatch() {
        let service: Arc<dyn DynEmbeddingService> = Arc::new(MockEmbedding::new());
        assert_eq!(service.dimensions(), 384);
        assert_eq!(service.embed_boxed("x").await.unwrap().len(), 384);
    }

    // ========================================================================
    // HTTP providers
    // ========================================================================

    #[tokio::test]
    async fn test_ollama_embedding() {
        let router = Router::new().route(
            "/api/embeddings",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "nomic-embed-text");
                assert_eq!(body["prompt"], "stakeholders");
                Json(serde_json::json!({"embedding": [0.1, 0.2, 0.3]}))
            }),
        );
        let url = spawn_server(router).await;
        let service = OllamaEmbedding::new(url, "nomic-embed-text", Duration::from_secs(5)).unwrap();
        assert_eq!(service.embed("stakeholders").await.unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_ollama_embedding_http_error() {
        let router = Router::new().route(
            "/api/embeddings",
            post(|| async { (axum::http::StatusCode::NOT_FOUND, "model not found") }),
        );
        let url = spawn_server(router).await;
        let service = OllamaEmbedding::new(url, "missing", Duration::from_secs(5)).unwrap();
        let err = service.embed("x").await.unwrap_err();
        assert!(matches!(err, AnalystError::Retrieval(m) if m.contains("404")));
    }

    #[tokio::test]
    async fn test_gemini_embedding() {
        let router = Router::new().route(
            "/v1beta/models/{call}",
            post(|Path(call): Path<String>, headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(call, "text-embedding-004:embedContent");
                assert_eq!(headers["x-goog-api-key"], "k");
                assert_eq!(body["content"]["parts"][0]["text"], "budget");
                Json(serde_json::json!({"embedding": {"values": [1.0, 0.0]}}))
            }),
        );
        let url = spawn_server(router).await;
        let service =
            GeminiEmbedding::new(url, "models/text-embedding-004", "k", Duration::from_secs(5)).unwrap();
        assert_eq!(service.embed("budget").await.unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_build_hash_provider() {
        let retrieval = RetrievalConfig {
            embedding_provider: "hash".into(),
            ..RetrievalConfig::default()
        };
        let service = build_embedding_service(&retrieval, &LlmConfig::default()).unwrap();
        assert_eq!(service.dimensions(), 384);
    }

    #[test]
    fn test_build_unknown_provider() {
        let retrieval = RetrievalConfig {
            embedding_provider: "word2vec".into(),
            ..RetrievalConfig::default()
        };
        assert!(build_embedding_service(&retrieval, &LlmConfig::default()).is_err());
    }
}
