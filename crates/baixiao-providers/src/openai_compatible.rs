//! OpenAI-compatible provider client.
//!
//! One struct serves both collaborator roles against any OpenAI-compatible
//! API (DashScope compatible mode, OpenAI, Ollama `/v1`, ...):
//! - `Generator`: `POST {base}/chat/completions` with `stream: true`, the SSE
//!   response is turned into a lazy stream of content deltas.
//! - `Embedder`: `POST {base}/embeddings`.

use async_trait::async_trait;
use baixiao_core::config::LlmConfig;
use baixiao_core::error::{BaixiaoError, Result};
use baixiao_core::traits::{Embedder, Generator, TokenStream};
use baixiao_core::types::Prompt;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;

/// A client for any OpenAI-compatible API.
pub struct OpenAiCompatibleClient {
    /// Provider name for logs (host of the base URL).
    name: String,
    /// API key for Bearer authentication.
    api_key: String,
    /// Base URL, e.g. "https://dashscope.aliyuncs.com/compatible-mode/v1".
    base_url: String,
    chat_model: String,
    embedding_model: String,
    embedding_dimensions: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    /// Build from the `[llm]` config section.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BaixiaoError::Config("llm.api_base_url is empty".into()));
        }

        // No total timeout: completions are long-lived streams.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| BaixiaoError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: provider_name(&base_url),
            api_key: config.api_key.clone(),
            base_url,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimensions: config.embedding_dimensions,
            client,
        })
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    fn require_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(BaixiaoError::ApiKeyMissing(self.name.clone()));
        }
        Ok(())
    }

    fn chat_body(&self, prompt: &Prompt) -> Value {
        json!({
            "model": self.chat_model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "stream": true,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        let resp = self.apply_auth(req).send().await.map_err(|e| {
            BaixiaoError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BaixiaoError::Provider(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, prompt: &Prompt) -> Result<TokenStream> {
        self.require_key()?;
        let body = self.chat_body(prompt);
        tracing::debug!(
            "{} chat stream: model={}, prompt_len={}",
            self.name,
            self.chat_model,
            prompt.user.len()
        );
        let resp = self.post_json("/chat/completions", &body).await?;
        Ok(completion_stream(resp.bytes_stream()))
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.require_key()?;
        let body = json!({
            "model": self.embedding_model,
            "input": text,
            "dimensions": self.embedding_dimensions,
            "encoding_format": "float",
        });
        let resp = self.post_json("/embeddings", &body).await?;
        let json: Value = resp
            .json()
            .await
            .map_err(|e| BaixiaoError::Http(e.to_string()))?;
        parse_embedding(&json)
    }
}

/// Outcome of one `chat.completion.chunk` SSE payload.
#[derive(Debug, PartialEq, Eq)]
enum ChunkOutcome {
    /// `[DONE]` sentinel.
    Finished,
    /// A delta, `None` for role-only / usage-only chunks.
    Delta(Option<String>),
}

fn parse_chunk(data: &str) -> Result<ChunkOutcome> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(ChunkOutcome::Finished);
    }
    let json: Value = serde_json::from_str(data)
        .map_err(|e| BaixiaoError::Generation(format!("Malformed stream chunk: {e}")))?;

    if let Some(error) = json.get("error") {
        let message = error["message"]
            .as_str()
            .or_else(|| error.as_str())
            .unwrap_or("An error occurred during streaming");
        return Err(BaixiaoError::Generation(message.to_string()));
    }

    let content = json["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|c| !c.is_empty())
        .map(String::from);
    Ok(ChunkOutcome::Delta(content))
}

/// Turn a raw SSE byte stream into content fragments.
///
/// Ends on `[DONE]` or when the body ends; the first error is yielded once and
/// ends the stream.
fn completion_stream<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut events = Box::pin(bytes.eventsource());
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => match parse_chunk(&event.data) {
                    Ok(ChunkOutcome::Finished) => break,
                    Ok(ChunkOutcome::Delta(Some(text))) => yield Ok(text),
                    Ok(ChunkOutcome::Delta(None)) => {}
                    Err(e) => {
                        tracing::warn!("Completion stream error: {e}");
                        yield Err(e);
                        break;
                    }
                },
                Err(e) => {
                    yield Err(BaixiaoError::Generation(format!("Stream interrupted: {e}")));
                    break;
                }
            }
        }
    };
    stream.boxed()
}

fn parse_embedding(json: &Value) -> Result<Vec<f32>> {
    let values = json["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| BaixiaoError::Provider("No embedding in response".into()))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| BaixiaoError::Provider("Non-numeric embedding value".into()))
        })
        .collect()
}

/// Host part of the base URL, used as the provider name.
fn provider_name(base_url: &str) -> String {
    let without_scheme = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    without_scheme
        .split(['/', ':'])
        .next()
        .filter(|h| !h.is_empty())
        .unwrap_or("openai-compatible")
        .to_string()
}
