//! # codeverse-ai — Coding assistant over a hosted completion API
//!
//! The assistant never runs a model itself. Every request becomes a list of
//! [`ChatMessage`]s handed to a [`CompletionBackend`]; the default backend
//! speaks the OpenAI-compatible `/chat/completions` protocol (Groq).
//!
//! - [`ChatSession`] keeps one user's conversation, seeded with a welcome message
//! - [`CodeAction`] turns a snippet into a task-specific prompt
//! - [`Assistant`] ties both to a backend, keyed by login session

mod actions;
mod backend;
mod chat;
mod error;

pub use actions::{Assistant, AssistRequest, CodeAction};
pub use backend::{AiConfig, ChatMessage, CompletionBackend, GroqBackend, Role};
pub use chat::{ChatRegistry, ChatSession, WELCOME_MESSAGE};
pub use error::AiError;
