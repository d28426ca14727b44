//! # Baixiao Knowledge Base
//!
//! Personal RAG library: documents are loaded, chunked, embedded through the
//! provider's embedding endpoint and kept in a single SQLite file.
//!
//! ## How it works
//! ```text
//! POST /add_library {"sources": ["./library/notes.md", "https://..."]}
//!   ↓ Ingestor (blocking pool)
//! load → preprocess → chunk (250 chars) → embed → upsert
//!
//! User: "期末考试安排是什么?"
//!   ↓ KnowledgeRetriever (blocking pool)
//! embed(query) → cosine scan → top 5 chunks
//!   ↓
//! Injected into the prompt as context
//! ```

pub mod chunker;
pub mod ingest;
pub mod loader;
pub mod retriever;
pub mod store;

pub use chunker::Chunker;
pub use ingest::{IngestReport, Ingestor};
pub use retriever::KnowledgeRetriever;
pub use store::KnowledgeStore;
