//! Retrieval client: embed the query, then scan the vector store.

use baixiao_core::error::{BaixiaoError, Result};
use baixiao_core::traits::{Embedder, Retriever};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::store::KnowledgeStore;

/// `Retriever` over a `KnowledgeStore`.
///
/// `retrieve` blocks: it drives the async embedding call on `runtime` and then
/// scans SQLite. Callers run it on the blocking pool.
pub struct KnowledgeRetriever {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    runtime: Handle,
    top_k: usize,
}

impl KnowledgeRetriever {
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        runtime: Handle,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            runtime,
            top_k,
        }
    }
}

impl Retriever for KnowledgeRetriever {
    fn retrieve(&self, query: &str) -> Result<Vec<String>> {
        let embedding = self
            .runtime
            .block_on(self.embedder.embed(query))
            .map_err(|e| BaixiaoError::Retrieval(e.to_string()))?;
        let hits = self.store.search(&embedding, self.top_k)?;
        tracing::debug!("Retrieved {} passage(s) for query ({} chars)", hits.len(), query.chars().count());
        Ok(hits.into_iter().map(|h| h.content).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    /// Maps text onto a tiny fixed vocabulary so similarity is predictable.
    pub(crate) struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let dims = ["cat", "dog", "fish"];
            Ok(dims
                .iter()
                .map(|w| if text.contains(w) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(BaixiaoError::Http("embedding endpoint unreachable".into()))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retrieve_returns_best_passages() {
        let store = Arc::new(KnowledgeStore::open(Path::new(":memory:")).unwrap());
        store.upsert("a#0", "a", "the cat sleeps", &[1.0, 0.0, 0.0]).unwrap();
        store.upsert("b#0", "b", "the dog barks", &[0.0, 1.0, 0.0]).unwrap();

        let retriever = KnowledgeRetriever::new(store, Arc::new(KeywordEmbedder), Handle::current(), 1);
        let passages = tokio::task::spawn_blocking(move || retriever.retrieve("where is my cat"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(passages, vec!["the cat sleeps"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_embedding_failure_is_retrieval_error() {
        let store = Arc::new(KnowledgeStore::open(Path::new(":memory:")).unwrap());
        let retriever = KnowledgeRetriever::new(store, Arc::new(FailingEmbedder), Handle::current(), 5);
        let err = tokio::task::spawn_blocking(move || retriever.retrieve("cat"))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, BaixiaoError::Retrieval(_)));
    }
}
