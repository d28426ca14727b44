//! # Baixiao Providers
//!
//! Language-model provider clients. Every supported backend speaks the
//! OpenAI-compatible wire format, so a single `OpenAiCompatibleClient` serves
//! as both the generation client and the embedding client.

pub mod openai_compatible;

use baixiao_core::config::LlmConfig;
use baixiao_core::error::Result;
use std::sync::Arc;

pub use openai_compatible::OpenAiCompatibleClient;

/// Create the shared provider client from configuration.
pub fn create_client(config: &LlmConfig) -> Result<Arc<OpenAiCompatibleClient>> {
    let client = OpenAiCompatibleClient::from_config(config)?;
    if config.api_key.is_empty() {
        tracing::warn!("⚠️ No API key configured (set DASHSCOPE_API_KEY) — chat and embeddings will fail");
    }
    Ok(Arc::new(client))
}
