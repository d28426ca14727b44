//! Baixiao configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BaixiaoError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaixiaoConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

impl BaixiaoConfig {
    /// Load config from `$BAIXIAO_CONFIG` or ~/.baixiao/config.toml, then
    /// apply environment overrides. A missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("BAIXIAO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BaixiaoError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BaixiaoError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Baixiao home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".baixiao")
    }

    /// Apply provider credentials from the environment.
    ///
    /// Called once at process start; non-empty env values win over the file.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("DASHSCOPE_API_KEY").filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Using API key from DASHSCOPE_API_KEY");
            self.llm.api_key = key.trim().to_string();
        }
        if let Some(base) = lookup("DASHSCOPE_API_BASE").filter(|v| !v.trim().is_empty()) {
            self.llm.api_base_url = base.trim().trim_end_matches('/').to_string();
            tracing::debug!("Using API base from DASHSCOPE_API_BASE: {}", self.llm.api_base_url);
        }
    }
}

/// Generation + embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String { "https://dashscope.aliyuncs.com/compatible-mode/v1".into() }
fn default_chat_model() -> String { "qwen-plus".into() }
fn default_embedding_model() -> String { "text-embedding-v4".into() }
fn default_embedding_dimensions() -> u32 { 1024 }
fn default_request_timeout() -> u64 { 120 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: default_api_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Assistant persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_name() -> String { "百晓喵".into() }
fn default_system_prompt() -> String {
    "Your name is 百晓喵, and you are a cat. Your identity is a student's learning and life assistant. \
Based on the document content provided below, answer the user's questions briefly and professionally. \
If there is no relevant information in the document, please first state that there is no relevant information, \
and then answer the question based on your known knowledge. \
Please answer in Chinese, in a tone befitting a cat."
        .into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// HTTP + WebSocket listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_http_port() -> u16 { 5000 }
fn default_ws_port() -> u16 { 5001 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            ws_port: default_ws_port(),
        }
    }
}

/// Per-session and per-connection timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Close WebSocket connections with no inbound traffic for this long.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_idle_check_interval")]
    pub idle_check_interval_secs: u64,
    /// Max wait between two generated fragments; 0 disables the limit.
    #[serde(default)]
    pub generation_timeout_secs: u64,
}

fn default_idle_timeout() -> u64 { 300 }
fn default_idle_check_interval() -> u64 { 10 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            idle_check_interval_secs: default_idle_check_interval(),
            generation_timeout_secs: 0,
        }
    }
}

/// Knowledge base (vector store + chunking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
}

fn default_db_path() -> String { "~/.baixiao/knowledge.db".into() }
fn default_top_k() -> usize { 5 }
fn default_chunk_size() -> usize { 250 }

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: 0,
        }
    }
}

impl KnowledgeConfig {
    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }
}
