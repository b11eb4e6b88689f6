//! Chat model capability shared by all providers.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::LlmError;
use crate::types::ChatRequest;

/// Incremental text chunks produced by a streaming model call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A configured language model client.
///
/// One instance is built at startup and shared across requests, so
/// implementations must be cheap to call concurrently.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for logs and health output.
    fn name(&self) -> &'static str;

    /// Model identifier sent to the provider.
    fn model(&self) -> &str;

    /// Run a request to completion and return the full text.
    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Run a request and yield text as the provider produces it.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError>;

    /// Check that the provider is reachable and the credentials work.
    async fn health_check(&self) -> Result<(), LlmError>;
}
