//! Error taxonomy shared by every Baixiao crate.

use thiserror::Error;

/// All errors produced inside Baixiao.
///
/// The `Display` text of each variant is what clients see, so variants carry
/// plain human-readable messages only.
#[derive(Debug, Error)]
pub enum BaixiaoError {
    /// Rejected before any retrieval or generation work starts.
    #[error("{0}")]
    InvalidInput(String),

    /// Retrieval failed; sessions degrade to an empty context.
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// The provider failed while streaming a completion.
    #[error("{0}")]
    Generation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("API key not configured for provider '{0}'")]
    ApiKeyMissing(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket protocol violation, fatal to the connection.
    #[error("{0}")]
    Protocol(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Knowledge store error: {0}")]
    Knowledge(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BaixiaoError {
    /// True for errors caused by the caller rather than by Baixiao.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Protocol(_) | Self::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, BaixiaoError>;
