//! # Baixiao Core
//!
//! Shared vocabulary for the Baixiao crates: configuration, the error
//! taxonomy, request-scoped types and the traits behind which retrieval,
//! embeddings and generation live.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{BaixiaoError, Result};
pub use traits::{Embedder, Generator, Retriever, TokenStream};
pub use types::{ChatHistoryEntry, Prompt, Query, StreamEvent};
