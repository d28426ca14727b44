//! # Baixiao Agent
//!
//! The session layer: builds a grounded prompt from retrieved passages and
//! chat history, drives the streaming generation call and turns it into a
//! transport-agnostic `StreamEvent` sequence.

pub mod prompt;
pub mod session;

pub use prompt::{NO_CONTEXT, PromptAssembler};
pub use session::{ChatOrchestrator, EventStream};
