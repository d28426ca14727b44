//! Seams to the external collaborators: retrieval, embeddings, generation.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::Prompt;

/// Lazy sequence of generated text fragments.
///
/// The stream ends normally on exhaustion; an `Err` item is terminal.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Given a query, returns the top-K relevant passages in relevance order.
///
/// Implementations are allowed to block (database scans, synchronous HTTP)
/// and are always invoked from the blocking thread pool.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str) -> Result<Vec<String>>;
}

/// Streaming chat-completion provider.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider name, used in logs.
    fn name(&self) -> &str;

    /// Start a completion and return its fragments as they arrive.
    async fn stream(&self, prompt: &Prompt) -> Result<TokenStream>;
}

/// Text embedding provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
