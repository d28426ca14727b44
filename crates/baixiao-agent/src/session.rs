//! Chat session orchestration.
//!
//! One `run` call drives a single request end to end:
//! retrieval (blocking pool) → prompt assembly (blocking pool) → streaming
//! generation → `StreamEvent`s for whichever transport is attached.
//!
//! Event contract: zero or more `Token`s, then exactly one `Error` or `Done`.

use baixiao_core::error::Result;
use baixiao_core::traits::{Generator, Retriever};
use baixiao_core::types::{ChatHistoryEntry, Query, StreamEvent};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

use crate::prompt::PromptAssembler;

/// Lazy sequence of session events.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Shared, read-mostly orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct ChatOrchestrator {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    assembler: Arc<PromptAssembler>,
    /// Max wait for the next fragment; `None` waits forever.
    fragment_timeout: Option<Duration>,
}

impl ChatOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        assembler: PromptAssembler,
    ) -> Self {
        Self {
            retriever,
            generator,
            assembler: Arc::new(assembler),
            fragment_timeout: None,
        }
    }

    pub fn with_fragment_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fragment_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Start a session.
    ///
    /// Blank queries fail here with `InvalidInput`, before any retrieval or
    /// generation happens. Otherwise nothing runs until the returned stream
    /// is polled; dropping the stream abandons the session.
    pub fn run(&self, query: &str, chat_history: Vec<ChatHistoryEntry>) -> Result<EventStream> {
        let query = Query::parse(query)?;
        let retriever = self.retriever.clone();
        let generator = self.generator.clone();
        let assembler = self.assembler.clone();
        let fragment_timeout = self.fragment_timeout;
        let session_id = uuid::Uuid::new_v4().simple().to_string();

        let stream = async_stream::stream! {
            tracing::debug!("session {session_id}: started ({} history entries)", chat_history.len());

            let passages = retrieve_passages(retriever, query.clone()).await;

            let prompt = match tokio::task::spawn_blocking(move || {
                assembler.assemble(&query, &passages, &chat_history)
            })
            .await
            {
                Ok(prompt) => prompt,
                Err(e) => {
                    tracing::error!("session {session_id}: prompt assembly failed: {e}");
                    yield StreamEvent::error("Failed to build prompt");
                    return;
                }
            };

            let mut fragments = match generator.stream(&prompt).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    tracing::warn!("session {session_id}: {} failed to start: {e}", generator.name());
                    yield StreamEvent::error(e.to_string());
                    return;
                }
            };

            let mut count: usize = 0;
            loop {
                let next = match fragment_timeout {
                    Some(limit) => match tokio::time::timeout(limit, fragments.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::warn!("session {session_id}: no fragment within {}ms", limit.as_millis());
                            yield StreamEvent::error(format!(
                                "Generation timed out after {}ms",
                                limit.as_millis()
                            ));
                            return;
                        }
                    },
                    None => fragments.next().await,
                };

                match next {
                    Some(Ok(fragment)) => {
                        count += 1;
                        yield StreamEvent::token(normalize_fragment(&fragment));
                    }
                    Some(Err(e)) => {
                        tracing::warn!("session {session_id}: generation failed after {count} fragment(s): {e}");
                        yield StreamEvent::error(e.to_string());
                        return;
                    }
                    None => break,
                }
            }

            tracing::debug!("session {session_id}: done ({count} fragments)");
            yield StreamEvent::Done;
        };

        Ok(stream.boxed())
    }
}

/// Retrieval on the blocking pool. Any failure degrades to no passages.
async fn retrieve_passages(retriever: Arc<dyn Retriever>, query: Query) -> Vec<String> {
    match tokio::task::spawn_blocking(move || retriever.retrieve(query.as_str())).await {
        Ok(Ok(passages)) => passages,
        Ok(Err(e)) => {
            tracing::warn!("⚠️ Retrieval failed, continuing without context: {e}");
            Vec::new()
        }
        Err(e) => {
            tracing::error!("Retrieval task aborted, continuing without context: {e}");
            Vec::new()
        }
    }
}

/// Drop line breaks and markdown emphasis from a generated fragment.
pub fn normalize_fragment(fragment: &str) -> String {
    fragment
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '*'))
        .collect()
}
