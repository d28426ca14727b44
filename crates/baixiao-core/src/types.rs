//! Request-scoped data shared between the orchestrator and the transports.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{BaixiaoError, Result};

/// One chat-history entry, passed through to the prompt untouched.
pub type ChatHistoryEntry = Map<String, Value>;

/// A validated user query: trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    /// Trim and validate raw client input.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BaixiaoError::InvalidInput("Query is required".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of output produced by a chat session.
///
/// A session yields any number of `Token`s followed by exactly one terminal
/// event (`Error` or `Done`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { text: String },
    Error { error: String },
    Done,
}

impl StreamEvent {
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// `Error` and `Done` end a session.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token { .. })
    }
}

/// System + user messages handed to the generation provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}
