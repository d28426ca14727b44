//! HTTP route handlers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use baixiao_agent::EventStream;
use baixiao_core::types::{ChatHistoryEntry, StreamEvent};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use super::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub chat_history: Option<Vec<ChatHistoryEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct AddLibraryRequest {
    #[serde(default)]
    pub sources: Vec<String>,
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "detail": message }))).into_response()
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Placeholder login; always succeeds.
pub async fn login() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Login successful" }))
}

/// Streaming chat over Server-Sent Events.
pub async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let history = req.chat_history.unwrap_or_default();
    match state.orchestrator.run(&req.query, history) {
        Ok(events) => {
            tracing::info!("💬 SSE chat: query_len={}", req.query.trim().chars().count());
            sse_response(events)
        }
        Err(e) if e.is_client_error() => detail(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            tracing::error!("SSE chat failed to start: {e}");
            detail(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// Wrap a session's events in a keep-alive SSE response.
pub fn sse_response(events: EventStream) -> Response {
    let frames = events.filter_map(|event| async move { to_sse_event(event).map(Ok::<_, Infallible>) });
    Sse::new(frames).keep_alive(KeepAlive::default()).into_response()
}

/// One frame per token or error; `Done` just ends the response.
pub fn to_sse_event(event: StreamEvent) -> Option<Event> {
    match event {
        StreamEvent::Token { text } => Some(Event::default().data(text)),
        StreamEvent::Error { error } => {
            Some(Event::default().data(serde_json::json!({ "error": error }).to_string()))
        }
        StreamEvent::Done => None,
    }
}

/// Kick off a knowledge base build and return immediately.
pub async fn add_library(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddLibraryRequest>,
) -> Response {
    let sources: Vec<String> = req
        .sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if sources.is_empty() {
        return detail(StatusCode::BAD_REQUEST, "Sources are required");
    }

    let job_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("📥 Library job {job_id}: {} source(s)", sources.len());

    let ingestor = state.ingestor.clone();
    let job = job_id.clone();
    tokio::task::spawn_blocking(move || {
        let report = ingestor.ingest(&sources);
        for failed in &report.sources_failed {
            tracing::warn!("⚠️ Library job {job}: {} failed: {}", failed.source, failed.error);
        }
        tracing::info!(
            "✅ Library job {job} finished: {} ok, {} failed, {} chunks",
            report.sources_ok,
            report.sources_failed.len(),
            report.chunks_stored
        );
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "Knowledge base build started",
            "job_id": job_id,
        })),
    )
        .into_response()
}
