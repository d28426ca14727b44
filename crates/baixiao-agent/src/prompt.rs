//! Grounding prompt assembly. Pure functions, no I/O.

use baixiao_core::types::{ChatHistoryEntry, Prompt, Query};

/// Context text used when retrieval produced nothing usable.
pub const NO_CONTEXT: &str = "No relevant documents found";

/// Combines the persona, retrieved passages, chat history and the query.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_prompt: String,
}

impl PromptAssembler {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn assemble(
        &self,
        query: &Query,
        passages: &[String],
        chat_history: &[ChatHistoryEntry],
    ) -> Prompt {
        let user = format!(
            "## context:\n{}\n## chat history:\n{}\n## question:\n{}",
            build_context(passages),
            format_history(chat_history),
            query.as_str()
        );
        Prompt {
            system: self.system_prompt.clone(),
            user,
        }
    }
}

/// Non-blank passages joined by newlines, or the `NO_CONTEXT` sentinel.
pub fn build_context(passages: &[String]) -> String {
    let kept: Vec<&str> = passages
        .iter()
        .map(String::as_str)
        .filter(|p| !p.trim().is_empty())
        .collect();
    if kept.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        kept.join("\n")
    }
}

/// One compact JSON object per line; empty history renders as "".
pub fn format_history(chat_history: &[ChatHistoryEntry]) -> String {
    chat_history
        .iter()
        .map(|entry| serde_json::Value::Object(entry.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
