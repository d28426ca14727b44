//! Knowledge base building: load → preprocess → chunk → embed → store.

use baixiao_core::error::{BaixiaoError, Result};
use baixiao_core::traits::Embedder;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::chunker::{Chunker, preprocess};
use crate::loader;
use crate::store::KnowledgeStore;

/// Result of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub sources_ok: usize,
    pub sources_failed: Vec<FailedSource>,
    pub chunks_stored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedSource {
    pub source: String,
    pub error: String,
}

/// Builds the knowledge base from a list of file paths and URLs.
///
/// Like `KnowledgeRetriever`, `ingest` blocks and must run on the blocking pool.
pub struct Ingestor {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    runtime: Handle,
    http: reqwest::Client,
    chunker: Chunker,
}

impl Ingestor {
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        runtime: Handle,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            embedder,
            runtime,
            http: reqwest::Client::new(),
            chunker,
        }
    }

    /// Ingest every source; a failing source is recorded and skipped.
    pub fn ingest(&self, sources: &[String]) -> IngestReport {
        let mut report = IngestReport::default();
        for source in sources {
            let source = source.trim();
            if source.is_empty() {
                continue;
            }
            match self.ingest_source(source) {
                Ok(count) => {
                    tracing::info!("📚 Ingested {source}: {count} chunk(s)");
                    report.sources_ok += 1;
                    report.chunks_stored += count;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to ingest {source}: {e}");
                    report.sources_failed.push(FailedSource {
                        source: source.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    fn ingest_source(&self, source: &str) -> Result<usize> {
        let doc = if loader::is_web_source(source) {
            self.runtime.block_on(loader::load_web(&self.http, source))?
        } else {
            loader::load_file(Path::new(source))?
        };

        let chunks = self.chunker.split(&preprocess(&doc.content));
        if chunks.is_empty() {
            return Err(BaixiaoError::Ingestion(format!("No text extracted from {source}")));
        }

        // Embed everything first so a provider failure leaves the old chunks intact.
        let mut embedded = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let embedding = self.runtime.block_on(self.embedder.embed(&chunk))?;
            embedded.push((format!("{source}#{idx}"), chunk, embedding));
        }

        self.store.replace_source(source, &embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::tests::KeywordEmbedder;

    fn ingestor(store: Arc<KnowledgeStore>) -> Ingestor {
        Ingestor::new(store, Arc::new(KeywordEmbedder), Handle::current(), Chunker::new(20, 0))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ingest_text_file() {
        let dir = std::env::temp_dir().join("baixiao-test-ingest");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pets.txt");
        std::fs::write(&path, "the cat likes fish.\n\nthe dog likes walks.").unwrap();
        let source = path.display().to_string();

        let store = Arc::new(KnowledgeStore::open(Path::new(":memory:")).unwrap());
        let ing = ingestor(store.clone());
        let sources = vec![source.clone(), "slides.pptx".to_string()];
        let report = tokio::task::spawn_blocking(move || ing.ingest(&sources))
            .await
            .unwrap();

        assert_eq!(report.sources_ok, 1);
        assert_eq!(report.chunks_stored, 2);
        assert_eq!(report.sources_failed.len(), 1);
        assert_eq!(report.sources_failed[0].source, "slides.pptx");
        assert_eq!(store.stats(), (1, 2));

        let hits = store.search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].content, "the dog likes walks.");
        assert_eq!(hits[0].id, format!("{source}#1"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reingest_replaces_old_chunks() {
        let dir = std::env::temp_dir().join("baixiao-test-reingest");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("notes.md");
        let source = path.display().to_string();
        let store = Arc::new(KnowledgeStore::open(Path::new(":memory:")).unwrap());

        std::fs::write(&path, "one cat.\n\ntwo cats.\n\nthree cats here.").unwrap();
        let ing = ingestor(store.clone());
        let s = vec![source.clone()];
        tokio::task::spawn_blocking(move || ing.ingest(&s)).await.unwrap();
        assert_eq!(store.stats(), (1, 3));

        std::fs::write(&path, "just a fish.").unwrap();
        let ing = ingestor(store.clone());
        let s = vec![source];
        tokio::task::spawn_blocking(move || ing.ingest(&s)).await.unwrap();
        assert_eq!(store.stats(), (1, 1));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blank_sources_are_skipped() {
        let store = Arc::new(KnowledgeStore::open(Path::new(":memory:")).unwrap());
        let ing = ingestor(store);
        let report = tokio::task::spawn_blocking(move || ing.ingest(&["  ".to_string()]))
            .await
            .unwrap();
        assert_eq!(report.sources_ok, 0);
        assert!(report.sources_failed.is_empty());
    }
}
